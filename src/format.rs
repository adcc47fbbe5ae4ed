//! Display masks for Brazilian documents and phone numbers.

use chrono::{Datelike, NaiveDate};

const CPF_DIGITS: usize = 11;
const PHONE_DIGITS: usize = 11;

/// Keeps only ASCII digits.
pub fn unformat(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// `###.###.###-##`, applied progressively to partial input.
pub fn format_cpf(value: &str) -> String {
    let mut output = String::with_capacity(14);
    for (i, digit) in unformat(value).chars().take(CPF_DIGITS).enumerate() {
        match i {
            3 | 6 => output.push('.'),
            9 => output.push('-'),
            _ => {}
        }
        output.push(digit);
    }
    output
}

/// `(##) ####-####` for landlines, `(##) # ####-####` for mobiles.
pub fn format_phone(value: &str) -> String {
    let digits: Vec<char> = unformat(value).chars().take(PHONE_DIGITS).collect();
    if digits.len() <= 2 {
        return digits.into_iter().collect();
    }

    let mut output = String::with_capacity(16);
    output.push('(');
    if digits.len() <= 10 {
        for (i, digit) in digits.iter().enumerate() {
            match i {
                2 => output.push_str(") "),
                6 => output.push('-'),
                _ => {}
            }
            output.push(*digit);
        }
    } else {
        for (i, digit) in digits.iter().enumerate() {
            match i {
                2 => output.push_str(") "),
                3 => output.push(' '),
                7 => output.push('-'),
                _ => {}
            }
            output.push(*digit);
        }
    }
    output
}

/// Whole years between `birth_date` and `today`.
pub fn age_on(birth_date: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth_date.year();
    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }
    age
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn cpf_mask_is_progressive() {
        assert_eq!(format_cpf("123"), "123");
        assert_eq!(format_cpf("1234"), "123.4");
        assert_eq!(format_cpf("1234567890"), "123.456.789-0");
        assert_eq!(format_cpf("123.456.789-01"), "123.456.789-01");
        assert_eq!(format_cpf("1234567890199"), "123.456.789-01");
        assert_eq!(format_cpf(""), "");
    }

    #[test]
    fn phone_mask_switches_on_length() {
        assert_eq!(format_phone("11"), "11");
        assert_eq!(format_phone("119"), "(11) 9");
        assert_eq!(format_phone("1198765432"), "(11) 9876-5432");
        assert_eq!(format_phone("11987654321"), "(11) 9 8765-4321");
        assert_eq!(format_phone("(11) 98765-4321"), "(11) 9 8765-4321");
    }

    #[test]
    fn unformat_strips_punctuation() {
        assert_eq!(unformat("123.456.789-01"), "12345678901");
    }

    #[test]
    fn age_counts_completed_years() {
        assert_eq!(age_on(date(2010, 6, 15), date(2026, 6, 14)), 15);
        assert_eq!(age_on(date(2010, 6, 15), date(2026, 6, 15)), 16);
        assert_eq!(age_on(date(2010, 2, 28), date(2026, 12, 1)), 16);
    }
}
