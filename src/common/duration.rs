/// Renders a track length for display.
///
/// Units are decomposed by floor division into days, hours, minutes and
/// seconds. Leading zero units are dropped, every remaining unit is padded
/// to two digits and a single remaining unit gets a `00` group in front so
/// the output always has at least two groups. Zero is the live sentinel.
pub fn format_duration(seconds: u64) -> String {
  if seconds == 0 {
    return "LIVE".to_string();
  }

  let (minutes, secs) = (seconds / 60, seconds % 60);
  let (hours, minutes) = (minutes / 60, minutes % 60);
  let (days, hours) = (hours / 24, hours % 24);

  let mut groups: Vec<String> = [days, hours, minutes, secs]
    .into_iter()
    .skip_while(|unit| *unit == 0)
    .map(|unit| format!("{:02}", unit))
    .collect();

  if groups.len() == 1 {
    groups.insert(0, "00".to_string());
  }

  groups.join(":")
}
