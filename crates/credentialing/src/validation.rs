//! Normalization and check-digit validation for Brazilian registry numbers.

/// Validation errors for registry numbers and contact data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid CPF '{0}'")]
    InvalidCpf(String),
    #[error("invalid CNPJ '{0}'")]
    InvalidCnpj(String),
    #[error("invalid email '{0}'")]
    InvalidEmail(String),
    #[error("{field} must not be empty")]
    Blank { field: &'static str },
}

fn digits(raw: &str) -> Vec<u32> {
    raw.chars().filter_map(|c| c.to_digit(10)).collect()
}

fn only_punctuation(raw: &str) -> bool {
    raw.chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '/' | ' '))
}

fn check_digit(numbers: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = numbers.iter().zip(weights).map(|(n, w)| n * w).sum();
    match sum % 11 {
        0 | 1 => 0,
        rest => 11 - rest,
    }
}

/// Returns the 11-digit CPF with punctuation stripped when the check digits hold.
pub fn normalize_cpf(raw: &str) -> Result<String, ValidationError> {
    let numbers = digits(raw);
    if !only_punctuation(raw) || numbers.len() != 11 || numbers.iter().all(|n| *n == numbers[0])
    {
        return Err(ValidationError::InvalidCpf(raw.to_string()));
    }

    let first = check_digit(&numbers[..9], &[10, 9, 8, 7, 6, 5, 4, 3, 2]);
    let second = check_digit(&numbers[..10], &[11, 10, 9, 8, 7, 6, 5, 4, 3, 2]);
    if numbers[9] != first || numbers[10] != second {
        return Err(ValidationError::InvalidCpf(raw.to_string()));
    }

    Ok(numbers.iter().map(|n| char::from_digit(*n, 10).unwrap_or('0')).collect())
}

/// Returns the 14-digit CNPJ with punctuation stripped when the check digits hold.
pub fn normalize_cnpj(raw: &str) -> Result<String, ValidationError> {
    let numbers = digits(raw);
    if !only_punctuation(raw) || numbers.len() != 14 || numbers.iter().all(|n| *n == numbers[0])
    {
        return Err(ValidationError::InvalidCnpj(raw.to_string()));
    }

    let first = check_digit(&numbers[..12], &[5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2]);
    let second = check_digit(&numbers[..13], &[6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2]);
    if numbers[12] != first || numbers[13] != second {
        return Err(ValidationError::InvalidCnpj(raw.to_string()));
    }

    Ok(numbers.iter().map(|n| char::from_digit(*n, 10).unwrap_or('0')).collect())
}

/// Lowercases and trims an email, rejecting values without a local part and a dotted domain.
pub fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_ascii_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(email)
    } else {
        Err(ValidationError::InvalidEmail(raw.to_string()))
    }
}

pub fn require_text(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::Blank { field })
    } else {
        Ok(trimmed.to_string())
    }
}
