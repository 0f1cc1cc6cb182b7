//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Rounded percentage; 0 when there is nothing to divide by.
pub fn percent(part: u64, whole: u64) -> i64 {
  if whole == 0 { 0 } else { ((part as f64 / whole as f64) * 100.0).round() as i64 }
}

/// Unwrap a reply wrapped in a Markdown code fence (```json ... ```). Fences inside
/// the payload are left alone.
pub fn strip_code_fences(s: &str) -> String {
  let trimmed = s.trim();
  let Some(rest) = trimmed.strip_prefix("```") else {
    return trimmed.to_string();
  };
  // Drop the language tag, if any.
  let body = match rest.find('\n') {
    Some(nl) if rest[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => &rest[nl + 1..],
    _ => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
  };
  body.strip_suffix("```").unwrap_or(body).trim().to_string()
}

/// Canonical form used for email lookups and uniqueness.
pub fn normalize_email(email: &str) -> String {
  email.trim().to_lowercase()
}

/// First `max` characters (not bytes), with an ellipsis when cut.
pub fn preview(s: &str, max: usize) -> String {
  let mut it = s.chars();
  let head: String = it.by_ref().take(max).collect();
  if it.next().is_some() { format!("{}...", head) } else { head }
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) { cut -= 1; }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}
