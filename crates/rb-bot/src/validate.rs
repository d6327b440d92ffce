use std::net::Ipv4Addr;

/// Symbols allowed in an RDP password besides ASCII letters and digits.
pub const PASSWORD_SYMBOLS: &str = "@#$%^&+=!*?._-";
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidInput {
    #[error("That is not a valid IPv4 address. Use the form 203.0.113.5.")]
    Ipv4,

    #[error("The password must be at least 8 characters long.")]
    PasswordTooShort,

    #[error("The password must contain at least one letter.")]
    PasswordMissingLetter,

    #[error("The password must contain at least one digit.")]
    PasswordMissingDigit,

    #[error("The password may only contain letters, digits and @#$%^&+=!*?._-")]
    PasswordCharacter,
}

/// Dotted-quad IPv4: four groups of one to three decimal digits, each 0-255.
pub fn validate_ipv4(raw: &str) -> Result<Ipv4Addr, InvalidInput> {
    let parts: Vec<&str> = raw.trim().split('.').collect();
    if parts.len() != 4 {
        return Err(InvalidInput::Ipv4);
    }

    let mut octets = [0u8; 4];
    for (octet, part) in octets.iter_mut().zip(&parts) {
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidInput::Ipv4);
        }
        *octet = part.parse().map_err(|_| InvalidInput::Ipv4)?;
    }
    Ok(Ipv4Addr::from(octets))
}

pub fn validate_password(raw: &str) -> Result<(), InvalidInput> {
    if raw.chars().count() < MIN_PASSWORD_LEN {
        return Err(InvalidInput::PasswordTooShort);
    }
    if !raw
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || PASSWORD_SYMBOLS.contains(c))
    {
        return Err(InvalidInput::PasswordCharacter);
    }
    if !raw.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(InvalidInput::PasswordMissingLetter);
    }
    if !raw.chars().any(|c| c.is_ascii_digit()) {
        return Err(InvalidInput::PasswordMissingDigit);
    }
    Ok(())
}

/// Whole positive amount, ignoring `,`, `.`, `_` and spaces used as
/// thousands separators.
pub fn parse_amount(raw: &str) -> Option<i64> {
    let digits: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '.' | '_' | ' '))
        .collect();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|amount: &i64| *amount > 0)
}
