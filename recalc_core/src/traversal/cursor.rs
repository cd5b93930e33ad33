use crate::models::EntityRef;

/// Minimum-id cursor over one entity collection.
///
/// Each page is requested with `id >= min_id`. After a page is consumed the
/// cursor moves to one past the page's maximum id, so no id is ever requested
/// twice even when the collection changes between fetches. Only an empty page
/// exhausts the cursor; the remote may return fewer items than requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    filter: String,
    min_id: u64,
    exhausted: bool,
}

impl PageCursor {
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            min_id: 0,
            exhausted: false,
        }
    }

    pub fn min_id(&self) -> u64 {
        self.min_id
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Predicate for the next page fetch.
    pub fn predicate(&self) -> String {
        page_predicate(&self.filter, self.min_id)
    }

    /// Consume a fetched page and move the cursor past it.
    pub fn advance(&mut self, page: &[EntityRef]) {
        let Some(max_id) = page.iter().map(|r| r.id).max() else {
            self.exhausted = true;
            return;
        };
        match max_id.checked_add(1) {
            Some(next) => self.min_id = next,
            None => self.exhausted = true,
        }
    }
}

/// `filter` on the first page, `(filter) and (id>=min_id)` afterwards.
pub fn page_predicate(filter: &str, min_id: u64) -> String {
    if min_id == 0 {
        filter.to_string()
    } else {
        format!("({filter}) and (id>={min_id})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(ids: &[u64]) -> Vec<EntityRef> {
        ids.iter().map(|id| EntityRef::new(*id, "bug")).collect()
    }

    #[test]
    fn first_page_uses_bare_filter() {
        let cursor = PageCursor::new("project.isactive==true");
        assert_eq!(cursor.predicate(), "project.isactive==true");
        assert_eq!(cursor.min_id(), 0);
    }

    #[test]
    fn advance_moves_past_max_id() {
        let mut cursor = PageCursor::new("true");
        cursor.advance(&page(&[4, 9, 7]));
        assert_eq!(cursor.min_id(), 10);
        assert!(!cursor.is_exhausted());
        assert_eq!(cursor.predicate(), "(true) and (id>=10)");
    }

    #[test]
    fn short_page_keeps_the_cursor_open() {
        let mut cursor = PageCursor::new("true");
        cursor.advance(&page(&[1, 2]));
        assert!(!cursor.is_exhausted());
        assert_eq!(cursor.min_id(), 3);
    }

    #[test]
    fn empty_page_exhausts_without_moving() {
        let mut cursor = PageCursor::new("true");
        cursor.advance(&page(&[1, 2, 3]));
        cursor.advance(&[]);
        assert!(cursor.is_exhausted());
        assert_eq!(cursor.min_id(), 4);
    }

    #[test]
    fn duplicate_boundary_ids_still_progress() {
        let mut cursor = PageCursor::new("true");
        cursor.advance(&page(&[5, 5, 5]));
        assert_eq!(cursor.min_id(), 6);
        assert!(!cursor.is_exhausted());
    }

    #[test]
    fn max_id_does_not_wrap() {
        let mut cursor = PageCursor::new("true");
        cursor.advance(&page(&[u64::MAX - 1, u64::MAX]));
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn page_zero_id_moves_cursor_to_one() {
        let mut cursor = PageCursor::new("true");
        cursor.advance(&page(&[0]));
        assert_eq!(cursor.predicate(), "(true) and (id>=1)");
    }
}
