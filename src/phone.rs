// Bangladeshi mobile numbers arrive as 017..., 8801..., +880 1..., 1...
// All of them collapse to the same E.164 form.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPhone {
    /// Digits exactly as typed, everything else stripped
    pub raw_digits: String,
    /// `+8801XXXXXXXXX` for local numbers, `+<digits>` otherwise
    pub e164: String,
}

impl NormalizedPhone {
    pub fn parse(input: &str) -> Self {
        let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();

        let e164 = if digits.len() == 11 && digits.starts_with("01") {
            format!("+88{digits}")
        } else if digits.len() == 13 && digits.starts_with("880") {
            format!("+{digits}")
        } else if digits.len() == 10 && digits.starts_with('1') {
            format!("+880{digits}")
        } else if !digits.is_empty() {
            format!("+{digits}")
        } else {
            String::new()
        };

        Self {
            raw_digits: digits,
            e164,
        }
    }

    // Digits of the E.164 form, used for guard keys
    pub fn key_digits(&self) -> &str {
        self.e164.trim_start_matches('+')
    }

    /// The number as customers usually store it locally (017...)
    pub fn local(&self) -> &str {
        self.raw_digits
            .strip_prefix("88")
            .unwrap_or(&self.raw_digits)
    }

    // Storefront requires an email; customers on this flow don't give one
    pub fn fallback_email(&self) -> String {
        format!("{}@noemail.com", self.raw_digits)
    }

    pub fn is_empty(&self) -> bool {
        self.raw_digits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_formats_collapse_to_one_key() {
        let inputs = [
            "01700000000",
            "017-0000-0000",
            "8801700000000",
            "+880 1700 000000",
            "1700000000",
        ];
        for input in inputs {
            let phone = NormalizedPhone::parse(input);
            assert_eq!(phone.e164, "+8801700000000", "input {input}");
            assert_eq!(phone.key_digits(), "8801700000000", "input {input}");
        }
    }

    #[test]
    fn foreign_numbers_just_get_a_plus() {
        let phone = NormalizedPhone::parse("(44) 20 7946 0958");
        assert_eq!(phone.e164, "+442079460958");
    }

    #[test]
    fn local_form_drops_country_prefix() {
        assert_eq!(NormalizedPhone::parse("+8801711223344").local(), "01711223344");
        assert_eq!(NormalizedPhone::parse("01711223344").local(), "01711223344");
    }

    #[test]
    fn fallback_email_uses_raw_digits() {
        let phone = NormalizedPhone::parse("017 1122 3344");
        assert_eq!(phone.fallback_email(), "01711223344@noemail.com");
    }

    #[test]
    fn empty_input() {
        let phone = NormalizedPhone::parse("n/a");
        assert!(phone.is_empty());
        assert_eq!(phone.e164, "");
        assert_eq!(phone.key_digits(), "");
    }
}
