//! 表单字段校验

use validator::ValidationError;

/// 电话号码：仅允许数字、空格、`+`、`-`、括号，且含 8 到 20 个字符
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')'));
    let len = phone.chars().count();
    if !allowed || !(8..=20).contains(&len) {
        let mut err = ValidationError::new("phone");
        err.message = Some("Invalid phone number".into());
        return Err(err);
    }
    Ok(())
}

/// 颜色：`#RRGGBB`
pub fn validate_color(color: &str) -> Result<(), ValidationError> {
    let bytes = color.as_bytes();
    if bytes.len() != 7 || bytes[0] != b'#' || !bytes[1..].iter().all(u8::is_ascii_hexdigit) {
        let mut err = ValidationError::new("color");
        err.message = Some("Color must be in #RRGGBB format".into());
        return Err(err);
    }
    Ok(())
}

/// 必填文本不能只包含空白
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Field cannot be blank".into());
        return Err(err);
    }
    Ok(())
}

/// 仅保留数字，用于电话号码比较
pub fn phone_digits(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

/// 空字符串视为未提供
pub fn blank_to_none(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone() {
        assert!(validate_phone("+55 (11) 98765-4321").is_ok());
        assert!(validate_phone("1234").is_err());
        assert!(validate_phone("11 9876-abcd").is_err());
    }

    #[test]
    fn test_color() {
        assert!(validate_color("#3B82F6").is_ok());
        assert!(validate_color("3B82F6").is_err());
        assert!(validate_color("#3B82FZ").is_err());
    }

    #[test]
    fn test_phone_digits() {
        assert_eq!(phone_digits("+55 (11) 9876-4321"), "5511987654321");
    }

    #[test]
    fn test_blank_to_none() {
        assert_eq!(blank_to_none(Some("  ".into())), None);
        assert_eq!(blank_to_none(Some(" a@b.c ".into())), Some("a@b.c".to_string()));
    }
}
