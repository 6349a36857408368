/// Reduce a provider contact identifier or a stored phone number to its bare
/// digit key.
///
/// Handles the provider's `<digits>@domain` form, `+`/`00` international
/// prefixes, and human formatting (spaces, dashes, parentheses).
pub fn normalize_phone(raw: &str) -> String {
    let local = raw.split('@').next().unwrap_or_default();
    let digits: String = local.chars().filter(char::is_ascii_digit).collect();
    match digits.strip_prefix("00") {
        Some(rest) => rest.to_string(),
        None => digits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_provider_domain() {
        assert_eq!(
            normalize_phone("5511999990000@s.whatsapp.net"),
            "5511999990000"
        );
    }

    #[test]
    fn strips_formatting_and_plus() {
        assert_eq!(normalize_phone("+55 (11) 99999-0000"), "5511999990000");
    }

    #[test]
    fn strips_double_zero_prefix() {
        assert_eq!(normalize_phone("005511999990000"), "5511999990000");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(normalize_phone(""), "");
        assert_eq!(normalize_phone("@broadcast"), "");
    }
}
