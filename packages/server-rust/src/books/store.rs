//! In-memory book storage.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::Book;
use crate::stages::ApiError;

/// Concurrent map of books keyed by id.
#[derive(Debug, Default)]
pub struct BookStore {
    books: DashMap<String, Book>,
}

impl BookStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// `ApiError::Conflict` if a book with the same id exists.
    pub fn insert(&self, book: Book) -> Result<(), ApiError> {
        match self.books.entry(book.id.clone()) {
            Entry::Occupied(_) => Err(ApiError::Conflict(format!("book {} already exists", book.id))),
            Entry::Vacant(slot) => {
                slot.insert(book);
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Book> {
        self.books.get(id).map(|entry| entry.value().clone())
    }

    /// Books ordered by title then id, optionally filtered by exact author.
    #[must_use]
    pub fn list(&self, author: Option<&str>, limit: Option<usize>) -> Vec<Book> {
        let mut books: Vec<Book> = self
            .books
            .iter()
            .filter(|entry| author.is_none_or(|a| entry.author == a))
            .map(|entry| entry.value().clone())
            .collect();
        books.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = limit {
            books.truncate(limit);
        }
        books
    }

    pub fn remove(&self, id: &str) -> Option<Book> {
        self.books.remove(id).map(|(_, book)| book)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.books.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}
