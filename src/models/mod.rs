use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod criteria;
pub mod group;
pub mod role;
pub mod user;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Pagination {
    pub total: i64,
    pub page: u32,
    pub pages: u32,
}

/// Normalized `page`/`limit` query values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(1),
            limit: limit.filter(|l| *l > 0).unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }

    pub fn pagination(&self, total: i64) -> Pagination {
        let limit = i64::from(self.limit);
        let pages = (total + limit - 1) / limit;
        Pagination {
            total,
            page: self.page,
            pages: u32::try_from(pages).unwrap_or(u32::MAX),
        }
    }
}
