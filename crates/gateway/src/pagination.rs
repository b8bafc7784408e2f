//! Page-number pagination for list endpoints

use dialer_database::Window;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::{ApiError, ApiResult};
use crate::hyperlink::LinkBase;
use crate::rest::{calendar_setting::CalendarSettingResponse, event::EventResponse};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PageQuery {
    /// 1-based page number
    pub page: Option<u32>,
}

/// Paginated list envelope
#[derive(Debug, Serialize, ToSchema)]
#[aliases(CalendarSettingPage = Page<CalendarSettingResponse>, EventPage = Page<EventResponse>)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Position of the requested page within a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub number: u32,
    pub size: u32,
}

impl PageRequest {
    /// Validate `query` against the collection size.
    ///
    /// Page 1 always exists; later pages must contain at least one row.
    pub fn new(query: &PageQuery, size: u32, count: i64) -> ApiResult<Self> {
        let number = query.page.unwrap_or(1);
        let size = size.max(1);
        let request = Self { number, size };

        if number == 0 || (number > 1 && number > request.last_page(count)) {
            return Err(ApiError::not_found("invalid page"));
        }

        Ok(request)
    }

    pub fn window(&self) -> Window {
        Window::new(
            i64::from(self.size),
            i64::from(self.number - 1) * i64::from(self.size),
        )
    }

    fn last_page(&self, count: i64) -> u32 {
        let size = i64::from(self.size);
        let pages = (count.max(0) + size - 1) / size;
        u32::try_from(pages.max(1)).unwrap_or(u32::MAX)
    }

    /// Wrap one page of `results` with its neighbour links
    pub fn envelope<T>(&self, base: &LinkBase, path: &str, count: i64, results: Vec<T>) -> Page<T> {
        let page_link = |number: u32| base.link_to(&format!("{path}?page={number}"));

        let next = (self.number < self.last_page(count)).then(|| page_link(self.number + 1));
        let previous = (self.number > 1).then(|| page_link(self.number - 1));

        Page {
            count,
            next,
            previous,
            results,
        }
    }
}
