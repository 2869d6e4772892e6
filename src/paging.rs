//! Fetch-until-exhausted loop for listing verbs.
//!
//! `browse/browse` and `browse/search` answer with one page of items and a
//! declared total (`count`). The first request carries no range; later ones
//! ask for `so_far..so_far + PAGE_SIZE - 1` until the total is reached.

use crate::error::Result;
use std::fmt;
use std::future::Future;

/// Largest page the device is ever asked for
pub const PAGE_SIZE: usize = 50;

/// Inclusive, zero-based item range, serialized as `start,end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemRange {
    pub start: usize,
    pub end: usize,
}

impl ItemRange {
    /// The page starting at `start`
    pub fn page(start: usize) -> Self {
        Self {
            start,
            end: start + PAGE_SIZE - 1,
        }
    }
}

impl fmt::Display for ItemRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.start, self.end)
    }
}

/// One response worth of items
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total the device declared; 0 when unknown
    pub total: usize,
}

/// Keep calling `fetch` until every declared item has been collected.
///
/// Stops early when the first page is empty with a total of 0 (unknown or
/// empty container), or when a page comes back empty before the total is
/// reached.
pub async fn fetch_all<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<ItemRange>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let first = fetch(None).await?;
    let mut total = first.total;
    let mut items = first.items;

    if total == 0 && items.is_empty() {
        return Ok(items);
    }

    while items.len() < total {
        let range = ItemRange::page(items.len());
        let page = fetch(Some(range)).await?;
        if page.items.is_empty() {
            tracing::debug!(
                "Page {} returned nothing with {} of {} items collected",
                range,
                items.len(),
                total
            );
            break;
        }
        total = page.total;
        items.extend(page.items);
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Device-side behavior: an unranged request yields the first page
    fn serve(total: usize, range: Option<ItemRange>) -> Page<usize> {
        let (start, end) = match range {
            None => (0, PAGE_SIZE.min(total)),
            Some(r) => (r.start.min(total), (r.end + 1).min(total)),
        };
        Page {
            items: (start..end).collect(),
            total,
        }
    }

    async fn run(total: usize) -> (Vec<usize>, Vec<Option<ItemRange>>) {
        let mut requests = Vec::new();
        let items = fetch_all(|range| {
            requests.push(range);
            let page = serve(total, range);
            async move { Ok(page) }
        })
        .await
        .unwrap();
        (items, requests)
    }

    #[test]
    fn test_range_display() {
        assert_eq!(ItemRange::page(50).to_string(), "50,99");
        assert_eq!(ItemRange::page(0).to_string(), "0,49");
    }

    #[tokio::test]
    async fn test_fetch_count_matches_ceiling() {
        for total in [0usize, 1, 49, 50, 51, 99, 100, 101, 237] {
            let (items, requests) = run(total).await;
            let expected_fetches = total.div_ceil(PAGE_SIZE).max(1);

            assert_eq!(items, (0..total).collect::<Vec<_>>(), "total {}", total);
            assert_eq!(requests.len(), expected_fetches, "total {}", total);
        }
    }

    #[tokio::test]
    async fn test_ranges_follow_collected_items() {
        let (_, requests) = run(120).await;
        assert_eq!(
            requests,
            vec![None, Some(ItemRange::page(50)), Some(ItemRange::page(100))]
        );
    }

    #[tokio::test]
    async fn test_unknown_total_stops_after_first_page() {
        let mut calls = 0;
        let items = fetch_all(|_| {
            calls += 1;
            async move {
                Ok(Page {
                    items: vec!["a", "b"],
                    total: 0,
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(items, vec!["a", "b"]);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_short_device_stops_on_empty_page() {
        let mut calls = 0;
        let items = fetch_all(|range| {
            calls += 1;
            let items = if range.is_none() { vec![1, 2, 3] } else { vec![] };
            async move { Ok(Page { items, total: 10 }) }
        })
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_errors_propagate() {
        let result: Result<Vec<u8>> = fetch_all(|range| async move {
            match range {
                None => Ok(Page {
                    items: vec![1],
                    total: 5,
                }),
                Some(_) => Err(crate::error::HeosError::Timeout),
            }
        })
        .await;

        assert!(matches!(result, Err(crate::error::HeosError::Timeout)));
    }
}
