//! 核心响应处理模块

use serde::{Deserialize, Serialize};

/// 默认每页条数
pub const DEFAULT_PER_PAGE: u32 = 20;
/// 每页条数上限
pub const MAX_PER_PAGE: u32 = 100;

/// 仅包含提示信息的响应
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// 分页查询参数
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// 归一化后的分页窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u32,
    pub per_page: u32,
}

impl PageQuery {
    pub fn window(&self, default_per_page: u32) -> PageWindow {
        PageWindow {
            page: self.page.unwrap_or(1).max(1),
            per_page: self.per_page.unwrap_or(default_per_page).clamp(1, MAX_PER_PAGE),
        }
    }
}

impl PageWindow {
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn pagination(&self, total: i64) -> Pagination {
        let per_page = i64::from(self.per_page);
        Pagination {
            page: self.page,
            pages: ((total + per_page - 1) / per_page) as u32,
            per_page: self.per_page,
            total,
        }
    }
}

/// 分页信息
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub pages: u32,
    pub per_page: u32,
    pub total: i64,
}

/// 把查询字符串中的 "true"/"false" 解析为布尔值，缺省为 `default`
pub fn flag(value: &Option<String>, default: bool) -> bool {
    value
        .as_deref()
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(default)
}

/// 把搜索词转为小写 `LIKE` 模式，空白搜索词返回 `None`
pub fn search_pattern(term: &Option<String>) -> Option<String> {
    term.as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| format!("%{}%", t.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_pattern() {
        assert_eq!(search_pattern(&Some(" Ana ".into())), Some("%ana%".to_string()));
        assert_eq!(search_pattern(&Some("  ".into())), None);
        assert_eq!(search_pattern(&None), None);
    }

    #[test]
    fn test_window_clamps() {
        let q = PageQuery {
            page: Some(0),
            per_page: Some(500),
        };
        let w = q.window(DEFAULT_PER_PAGE);
        assert_eq!(w.page, 1);
        assert_eq!(w.per_page, MAX_PER_PAGE);
        assert_eq!(w.offset(), 0);
    }

    #[test]
    fn test_pagination_pages() {
        let w = PageQuery {
            page: Some(2),
            per_page: Some(10),
        }
        .window(DEFAULT_PER_PAGE);
        assert_eq!(w.offset(), 10);
        assert_eq!(w.pagination(21).pages, 3);
        assert_eq!(w.pagination(0).pages, 0);
    }

    #[test]
    fn test_flag() {
        assert!(flag(&Some("TRUE".into()), false));
        assert!(!flag(&Some("no".into()), true));
        assert!(flag(&None, true));
    }
}
