//! Small utility helpers used across modules.

/// True if `name` is usable as a verification target name (`^[a-zA-Z0-9]+$`).
pub fn is_alphanumeric_name(name: &str) -> bool {
  !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric())
}

/// True if `name` can be exported as an environment variable:
/// `[a-zA-Z_][a-zA-Z0-9_]*`, matched against the whole string.
pub fn is_valid_env_name(name: &str) -> bool {
  let mut chars = name.chars();
  match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
    _ => return false,
  }
  chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split captured process output into non-empty lines.
/// Blank lines are dropped so partial progress stays readable.
pub fn split_output_lines(output: &str) -> Vec<String> {
  output
    .split('\n')
    .map(|line| line.trim_end_matches('\r'))
    .filter(|line| !line.is_empty())
    .map(|line| line.to_string())
    .collect()
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
#[allow(dead_code)]
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max { s.to_string() } else { format!("{}… ({} bytes total)", &s[..max], s.len()) }
}
