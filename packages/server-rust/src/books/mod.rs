//! Example resource served entirely through chains.

pub mod endpoints;
pub mod store;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::stages::{ApiError, Validate};

pub use endpoints::{create_book, delete_book, get_book, list_books};
pub use store::BookStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Assigned by the server when empty.
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub pages: u32,
    #[serde(default)]
    pub language: String,
    pub author: String,
    #[serde(default)]
    pub published_on: Option<NaiveDate>,
}

impl Validate for Book {
    fn validate(&self) -> Result<(), ApiError> {
        if self.title.trim().is_empty() {
            return Err(ApiError::BadRequest("title must not be empty".into()));
        }
        if self.author.trim().is_empty() {
            return Err(ApiError::BadRequest("author must not be empty".into()));
        }
        if self.pages == 0 {
            return Err(ApiError::BadRequest("pages must be positive".into()));
        }
        // Ids end up in the Location header and in URLs.
        if !self
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ApiError::BadRequest(
                "id may only contain letters, digits, '-' and '_'".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> Book {
        Book {
            title: "The Dispossessed".into(),
            pages: 387,
            author: "Ursula K. Le Guin".into(),
            ..Book::default()
        }
    }

    #[test]
    fn valid_book_passes() {
        assert!(book().validate().is_ok());
    }

    #[test]
    fn invalid_books_are_rejected() {
        let cases = [
            Book { title: " ".into(), ..book() },
            Book { author: String::new(), ..book() },
            Book { pages: 0, ..book() },
            Book { id: "a/b".into(), ..book() },
        ];
        for case in cases {
            assert!(matches!(case.validate(), Err(ApiError::BadRequest(_))), "{case:?}");
        }
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let parsed: Book =
            serde_json::from_str(r#"{"title":"Kindred","pages":264,"author":"Octavia E. Butler"}"#)
                .unwrap();
        assert!(parsed.id.is_empty());
        assert!(parsed.language.is_empty());
        assert!(parsed.published_on.is_none());
    }
}
