//! Password complexity classification.

use std::fmt;

/// Symbols that count toward (and are allowed in) a strong password.
pub const PASSWORD_SYMBOLS: &[char] = &['!', '@', '#', '$', '%', '^', '&', '*', '(', ')'];

/// Minimum length of a strong password, in characters.
pub const MIN_STRONG_LENGTH: usize = 8;

/// Verdict of the complexity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordStrength {
    Strong,
    Weak,
}

impl fmt::Display for PasswordStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordStrength::Strong => write!(f, "strong"),
            PasswordStrength::Weak => write!(f, "weak"),
        }
    }
}

/// Classify a password.
///
/// Strong requires at least [`MIN_STRONG_LENGTH`] characters, one ASCII
/// uppercase letter, one ASCII lowercase letter, one ASCII digit and one of
/// [`PASSWORD_SYMBOLS`]. Any character outside that alphabet makes the
/// password weak regardless of the other classes.
pub fn classify(password: &str) -> PasswordStrength {
    let mut length = 0usize;
    let mut upper = false;
    let mut lower = false;
    let mut digit = false;
    let mut symbol = false;

    for c in password.chars() {
        length += 1;
        if c.is_ascii_uppercase() {
            upper = true;
        } else if c.is_ascii_lowercase() {
            lower = true;
        } else if c.is_ascii_digit() {
            digit = true;
        } else if PASSWORD_SYMBOLS.contains(&c) {
            symbol = true;
        } else {
            return PasswordStrength::Weak;
        }
    }

    if length >= MIN_STRONG_LENGTH && upper && lower && digit && symbol {
        PasswordStrength::Strong
    } else {
        PasswordStrength::Weak
    }
}
