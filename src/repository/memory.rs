//! In-memory implementation of every store
//!
//! One mutex guards the whole state and every method holds it for its full
//! body, so `checkout` and `checkin` are atomic just like the Postgres
//! transactions. Constraint violations produce the same errors as the
//! database constraints do.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    error::{AppError, AppResult},
    models::{
        author::{Author, AuthorListEntry, AuthorRef, CreateAuthor, UpdateAuthor},
        book::{
            adjusted_available, Book, BookDetails, BookFilter, BookListEntry, BookOpenBorrow, BookRef,
            BookWithAuthor, NewBook, UpdateBook,
        },
        borrow::{
            BookRefWithAuthor, Borrow, BorrowDetails, BorrowListEntry, BorrowReceipt, BorrowedBook,
            NewBorrow, UserBorrowEntry,
        },
        user::{NewUser, User, UserDetails, UserListEntry, UserOpenBorrow, UserProfile, UserSummary},
        BooksCount, BorrowsCount,
    },
};

use super::{
    authors::{has_books_error, AuthorStore},
    books::{has_borrows_error, quantity_below_borrowed, BookStore},
    borrows::BorrowStore,
    contains_ci,
    users::UserStore,
};

#[derive(Default)]
struct State {
    authors: BTreeMap<i32, Author>,
    books: BTreeMap<i32, Book>,
    users: BTreeMap<i32, User>,
    borrows: BTreeMap<i32, Borrow>,
    last_author_id: i32,
    last_book_id: i32,
    last_user_id: i32,
    last_borrow_id: i32,
}

fn next_id(counter: &mut i32) -> i32 {
    *counter += 1;
    *counter
}

/// Newest first, like `ORDER BY borrowed_at DESC, id DESC`
fn newest_first(borrows: &mut [Borrow]) {
    borrows.sort_by(|a, b| b.borrowed_at.cmp(&a.borrowed_at).then(b.id.cmp(&a.id)));
}

impl State {
    fn book_ref_with_author(&self, book_id: i32) -> AppResult<(Book, AuthorRef)> {
        let book = self.books.get(&book_id).ok_or_else(|| AppError::not_found("Book", book_id))?;
        let author = self
            .authors
            .get(&book.author_id)
            .ok_or_else(|| AppError::not_found("Author", book.author_id))?;
        Ok((book.clone(), AuthorRef::from(author)))
    }

    fn user_summary(&self, user_id: i32) -> AppResult<UserSummary> {
        self.users
            .get(&user_id)
            .map(UserSummary::from)
            .ok_or_else(|| AppError::not_found("User", user_id))
    }

    fn borrow_count(&self, pred: impl Fn(&Borrow) -> bool) -> i64 {
        self.borrows.values().filter(|b| pred(b)).count() as i64
    }

    fn isbn_taken(&self, isbn: &str, except: Option<i32>) -> bool {
        self.books
            .values()
            .any(|b| b.isbn == isbn && Some(b.id) != except)
    }

    fn matches(book: &Book, filter: &BookFilter) -> bool {
        if let Some(term) = filter.search_term() {
            let hit = contains_ci(&book.title, term)
                || contains_ci(&book.isbn, term)
                || book.description.as_deref().is_some_and(|d| contains_ci(d, term));
            if !hit {
                return false;
            }
        }
        if filter.author_id.is_some_and(|id| id != book.author_id) {
            return false;
        }
        match filter.available {
            Some(true) => book.available > 0,
            Some(false) => book.available == 0,
            None => true,
        }
    }
}

/// Store keeping everything in process memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthorStore for MemoryStore {
    async fn create(&self, author: &CreateAuthor) -> AppResult<Author> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let author = Author {
            id: next_id(&mut state.last_author_id),
            name: author.name.clone(),
            bio: author.bio.clone(),
            created_at: now,
            updated_at: now,
        };
        state.authors.insert(author.id, author.clone());
        Ok(author)
    }

    async fn get(&self, id: i32) -> AppResult<Option<Author>> {
        Ok(self.state.lock().await.authors.get(&id).cloned())
    }

    async fn list(&self, search: Option<String>) -> AppResult<Vec<AuthorListEntry>> {
        let state = self.state.lock().await;
        let term = search.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let mut authors: Vec<&Author> = state
            .authors
            .values()
            .filter(|a| match term {
                Some(term) => {
                    contains_ci(&a.name, term) || a.bio.as_deref().is_some_and(|b| contains_ci(b, term))
                }
                None => true,
            })
            .collect();
        authors.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        Ok(authors
            .into_iter()
            .map(|author| {
                let mut books: Vec<&Book> = state.books.values().filter(|b| b.author_id == author.id).collect();
                books.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
                let books: Vec<BookRef> = books.into_iter().map(BookRef::from).collect();
                AuthorListEntry {
                    author: author.clone(),
                    count: BooksCount { books: books.len() as i64 },
                    books,
                }
            })
            .collect())
    }

    async fn books_of(&self, id: i32) -> AppResult<Vec<Book>> {
        let state = self.state.lock().await;
        let mut books: Vec<Book> = state.books.values().filter(|b| b.author_id == id).cloned().collect();
        books.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(books)
    }

    async fn update(&self, id: i32, update: &UpdateAuthor) -> AppResult<Option<Author>> {
        let mut state = self.state.lock().await;
        let Some(author) = state.authors.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(ref name) = update.name {
            author.name = name.clone();
        }
        if let Some(ref bio) = update.bio {
            author.bio = Some(bio.clone());
        }
        author.updated_at = Utc::now();
        Ok(Some(author.clone()))
    }

    async fn delete(&self, id: i32) -> AppResult<Option<Author>> {
        let mut state = self.state.lock().await;
        if !state.authors.contains_key(&id) {
            return Ok(None);
        }
        if state.books.values().any(|b| b.author_id == id) {
            return Err(has_books_error());
        }
        Ok(state.authors.remove(&id))
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn create(&self, book: &NewBook) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        if state.isbn_taken(&book.isbn, None) {
            return Err(AppError::Conflict("Book with this ISBN already exists".to_string()));
        }
        if !state.authors.contains_key(&book.author_id) {
            return Err(AppError::Validation(format!("Author with ID {} not found", book.author_id)));
        }

        let now = Utc::now();
        let book = Book {
            id: next_id(&mut state.last_book_id),
            title: book.title.clone(),
            isbn: book.isbn.clone(),
            description: book.description.clone(),
            published_at: book.published_at,
            quantity: book.quantity,
            available: book.quantity,
            author_id: book.author_id,
            created_at: now,
            updated_at: now,
        };
        state.books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn get(&self, id: i32) -> AppResult<Option<Book>> {
        Ok(self.state.lock().await.books.get(&id).cloned())
    }

    async fn get_with_author(&self, id: i32) -> AppResult<Option<BookWithAuthor>> {
        let state = self.state.lock().await;
        let Some(book) = state.books.get(&id) else {
            return Ok(None);
        };
        let author = state
            .authors
            .get(&book.author_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Author", book.author_id))?;
        Ok(Some(BookWithAuthor {
            book: book.clone(),
            author,
        }))
    }

    async fn details(&self, id: i32) -> AppResult<Option<BookDetails>> {
        let state = self.state.lock().await;
        let Some(book) = state.books.get(&id) else {
            return Ok(None);
        };
        let author = state
            .authors
            .get(&book.author_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Author", book.author_id))?;

        let mut open: Vec<Borrow> = state
            .borrows
            .values()
            .filter(|b| b.book_id == id && b.is_open())
            .cloned()
            .collect();
        newest_first(&mut open);

        let borrows = open
            .into_iter()
            .map(|borrow| -> AppResult<BookOpenBorrow> {
                Ok(BookOpenBorrow {
                    user: state.user_summary(borrow.user_id)?,
                    borrow,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Some(BookDetails {
            book: book.clone(),
            author,
            borrows,
        }))
    }

    async fn search(&self, filter: &BookFilter) -> AppResult<(Vec<BookListEntry>, i64)> {
        let state = self.state.lock().await;
        let mut matching: Vec<&Book> = state.books.values().filter(|b| State::matches(b, filter)).collect();
        matching.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        let total = matching.len() as i64;

        let page = matching
            .into_iter()
            .skip(usize::try_from(filter.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(filter.limit()).unwrap_or(0))
            .map(|book| -> AppResult<BookListEntry> {
                let (book, author) = state.book_ref_with_author(book.id)?;
                let borrows = state.borrow_count(|b| b.book_id == book.id);
                Ok(BookListEntry {
                    book,
                    author,
                    count: BorrowsCount { borrows },
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok((page, total))
    }

    async fn update(&self, id: i32, update: &UpdateBook) -> AppResult<Option<Book>> {
        let mut state = self.state.lock().await;
        let Some(current) = state.books.get(&id).cloned() else {
            return Ok(None);
        };

        if let Some(ref isbn) = update.isbn {
            if state.isbn_taken(isbn, Some(id)) {
                return Err(AppError::Conflict("Book with this ISBN already exists".to_string()));
            }
        }
        if let Some(author_id) = update.author_id {
            if !state.authors.contains_key(&author_id) {
                return Err(AppError::Validation(format!("Author with ID {} not found", author_id)));
            }
        }

        let mut book = current;
        if let Some(quantity) = update.quantity {
            book.available = adjusted_available(&book, quantity).ok_or_else(quantity_below_borrowed)?;
            book.quantity = quantity;
        }
        if let Some(ref title) = update.title {
            book.title = title.clone();
        }
        if let Some(ref isbn) = update.isbn {
            book.isbn = isbn.clone();
        }
        if let Some(ref description) = update.description {
            book.description = description.clone();
        }
        if let Some(published_at) = update.published_at {
            book.published_at = published_at;
        }
        if let Some(author_id) = update.author_id {
            book.author_id = author_id;
        }
        book.updated_at = Utc::now();

        state.books.insert(id, book.clone());
        Ok(Some(book))
    }

    async fn has_borrows(&self, id: i32) -> AppResult<bool> {
        Ok(self.state.lock().await.borrows.values().any(|b| b.book_id == id))
    }

    async fn delete(&self, id: i32) -> AppResult<Option<Book>> {
        let mut state = self.state.lock().await;
        if !state.books.contains_key(&id) {
            return Ok(None);
        }
        if state.borrows.values().any(|b| b.book_id == id) {
            return Err(has_borrows_error());
        }
        Ok(state.books.remove(&id))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: &NewUser) -> AppResult<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(AppError::Conflict("User with this email already exists".to_string()));
        }

        let user = User {
            id: next_id(&mut state.last_user_id),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            name: user.name.clone(),
            role: user.role,
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get(&self, id: i32) -> AppResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn list(&self, search: Option<String>) -> AppResult<Vec<UserListEntry>> {
        let state = self.state.lock().await;
        let term = search.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let mut users: Vec<&User> = state
            .users
            .values()
            .filter(|u| term.map_or(true, |t| contains_ci(&u.name, t) || contains_ci(&u.email, t)))
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        Ok(users
            .into_iter()
            .map(|user| UserListEntry {
                count: BorrowsCount {
                    borrows: state.borrow_count(|b| b.user_id == user.id),
                },
                user: UserProfile::from(user.clone()),
            })
            .collect())
    }

    async fn details(&self, id: i32) -> AppResult<Option<UserDetails>> {
        let state = self.state.lock().await;
        let Some(user) = state.users.get(&id) else {
            return Ok(None);
        };

        let mut open: Vec<Borrow> = state
            .borrows
            .values()
            .filter(|b| b.user_id == id && b.is_open())
            .cloned()
            .collect();
        newest_first(&mut open);

        let borrows = open
            .into_iter()
            .map(|borrow| -> AppResult<UserOpenBorrow> {
                let book = state
                    .books
                    .get(&borrow.book_id)
                    .map(BookRef::from)
                    .ok_or_else(|| AppError::not_found("Book", borrow.book_id))?;
                Ok(UserOpenBorrow { borrow, book })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Some(UserDetails {
            user: UserProfile::from(user.clone()),
            borrows,
            count: BorrowsCount {
                borrows: state.borrow_count(|b| b.user_id == id),
            },
        }))
    }
}

#[async_trait]
impl BorrowStore for MemoryStore {
    async fn get(&self, id: i32) -> AppResult<Option<Borrow>> {
        Ok(self.state.lock().await.borrows.get(&id).cloned())
    }

    async fn find_open(&self, user_id: i32, book_id: i32) -> AppResult<Option<Borrow>> {
        let state = self.state.lock().await;
        Ok(state
            .borrows
            .values()
            .find(|b| b.user_id == user_id && b.book_id == book_id && b.is_open())
            .cloned())
    }

    async fn checkout(&self, new: &NewBorrow) -> AppResult<BorrowReceipt> {
        let mut state = self.state.lock().await;

        let user = state.user_summary(new.user_id)?;
        let book = state
            .books
            .get(&new.book_id)
            .ok_or_else(|| AppError::not_found("Book", new.book_id))?;
        if book.available <= 0 {
            return Err(AppError::book_not_available());
        }
        if state
            .borrows
            .values()
            .any(|b| b.user_id == new.user_id && b.book_id == new.book_id && b.is_open())
        {
            return Err(AppError::already_borrowed());
        }

        let borrow = Borrow {
            id: next_id(&mut state.last_borrow_id),
            user_id: new.user_id,
            book_id: new.book_id,
            borrowed_at: new.borrowed_at,
            due_at: new.due_at,
            returned_at: None,
        };
        state.borrows.insert(borrow.id, borrow.clone());

        let book = state
            .books
            .get_mut(&new.book_id)
            .ok_or_else(|| AppError::not_found("Book", new.book_id))?;
        book.available -= 1;
        book.updated_at = Utc::now();

        Ok(BorrowReceipt {
            borrow,
            user,
            book: BookRef::from(&*book),
        })
    }

    async fn checkin(&self, borrow_id: i32, returned_at: DateTime<Utc>) -> AppResult<BorrowReceipt> {
        let mut state = self.state.lock().await;

        let borrow = state
            .borrows
            .get(&borrow_id)
            .ok_or_else(|| AppError::not_found("Borrow record", borrow_id))?;
        if !borrow.is_open() {
            return Err(AppError::already_returned());
        }
        let (user_id, book_id) = (borrow.user_id, borrow.book_id);
        let user = state.user_summary(user_id)?;

        let book = state
            .books
            .get_mut(&book_id)
            .ok_or_else(|| AppError::not_found("Book", book_id))?;
        book.available += 1;
        book.updated_at = Utc::now();
        let book = BookRef::from(&*book);

        let borrow = state
            .borrows
            .get_mut(&borrow_id)
            .ok_or_else(|| AppError::not_found("Borrow record", borrow_id))?;
        borrow.returned_at = Some(returned_at);

        Ok(BorrowReceipt {
            borrow: borrow.clone(),
            user,
            book,
        })
    }

    async fn list(&self, include_returned: bool) -> AppResult<Vec<BorrowListEntry>> {
        let state = self.state.lock().await;
        let mut borrows: Vec<Borrow> = state
            .borrows
            .values()
            .filter(|b| include_returned || b.is_open())
            .cloned()
            .collect();
        newest_first(&mut borrows);

        borrows
            .into_iter()
            .map(|borrow| -> AppResult<BorrowListEntry> {
                let (book, author) = state.book_ref_with_author(borrow.book_id)?;
                Ok(BorrowListEntry {
                    user: state.user_summary(borrow.user_id)?,
                    book: BookRefWithAuthor {
                        id: book.id,
                        title: book.title,
                        isbn: book.isbn,
                        author,
                    },
                    borrow,
                })
            })
            .collect()
    }

    async fn list_by_user(&self, user_id: i32, include_returned: bool) -> AppResult<Vec<UserBorrowEntry>> {
        let state = self.state.lock().await;
        let mut borrows: Vec<Borrow> = state
            .borrows
            .values()
            .filter(|b| b.user_id == user_id && (include_returned || b.is_open()))
            .cloned()
            .collect();
        newest_first(&mut borrows);

        borrows
            .into_iter()
            .map(|borrow| -> AppResult<UserBorrowEntry> {
                let (book, author) = state.book_ref_with_author(borrow.book_id)?;
                Ok(UserBorrowEntry {
                    book: BorrowedBook { book, author },
                    borrow,
                })
            })
            .collect()
    }

    async fn details(&self, id: i32) -> AppResult<Option<BorrowDetails>> {
        let state = self.state.lock().await;
        let Some(borrow) = state.borrows.get(&id).cloned() else {
            return Ok(None);
        };
        let user = state.user_summary(borrow.user_id)?;
        let book = state
            .books
            .get(&borrow.book_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Book", borrow.book_id))?;
        let author = state
            .authors
            .get(&book.author_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Author", book.author_id))?;

        Ok(Some(BorrowDetails {
            borrow,
            user,
            book: BookWithAuthor { book, author },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::Duration;

    async fn seeded() -> (MemoryStore, User, Book) {
        let store = MemoryStore::new();
        let author = AuthorStore::create(
            &store,
            &CreateAuthor {
                name: "George Orwell".into(),
                bio: None,
            },
        )
        .await
        .unwrap();
        let book = BookStore::create(
            &store,
            &NewBook {
                title: "1984".into(),
                isbn: "9780451524935".into(),
                description: None,
                published_at: None,
                quantity: 1,
                author_id: author.id,
            },
        )
        .await
        .unwrap();
        let user = UserStore::create(
            &store,
            &NewUser {
                email: "reader@library.com".into(),
                password_hash: "x".into(),
                name: "Reader".into(),
                role: Role::User,
            },
        )
        .await
        .unwrap();
        (store, user, book)
    }

    fn new_borrow(user: &User, book: &Book) -> NewBorrow {
        let now = Utc::now();
        NewBorrow {
            user_id: user.id,
            book_id: book.id,
            borrowed_at: now,
            due_at: now + Duration::days(14),
        }
    }

    #[tokio::test]
    async fn test_checkout_takes_last_copy() {
        let (store, user, book) = seeded().await;

        let receipt = store.checkout(&new_borrow(&user, &book)).await.unwrap();
        assert!(receipt.borrow.is_open());
        assert_eq!(receipt.user.email, "reader@library.com");
        assert_eq!(BookStore::get(&store, book.id).await.unwrap().unwrap().available, 0);

        let err = store.checkout(&new_borrow(&user, &book)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "Book is not available for borrowing"));
    }

    #[tokio::test]
    async fn test_checkin_twice_is_rejected() {
        let (store, user, book) = seeded().await;
        let receipt = store.checkout(&new_borrow(&user, &book)).await.unwrap();

        store.checkin(receipt.borrow.id, Utc::now()).await.unwrap();
        assert_eq!(BookStore::get(&store, book.id).await.unwrap().unwrap().available, 1);

        let err = store.checkin(receipt.borrow.id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "Book has already been returned"));
        assert_eq!(BookStore::get(&store, book.id).await.unwrap().unwrap().available, 1);
    }

    #[tokio::test]
    async fn test_duplicate_isbn_and_email_conflict() {
        let (store, _, book) = seeded().await;

        let err = BookStore::create(
            &store,
            &NewBook {
                title: "Nineteen Eighty-Four".into(),
                isbn: book.isbn.clone(),
                description: None,
                published_at: None,
                quantity: 1,
                author_id: book.author_id,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = UserStore::create(
            &store,
            &NewUser {
                email: "READER@library.com".into(),
                password_hash: "x".into(),
                name: "Other".into(),
                role: Role::User,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_deletes_respect_references() {
        let (store, user, book) = seeded().await;

        let err = AuthorStore::delete(&store, book.author_id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "Cannot delete author with existing books"));

        let receipt = store.checkout(&new_borrow(&user, &book)).await.unwrap();
        store.checkin(receipt.borrow.id, Utc::now()).await.unwrap();

        // A closed borrow still blocks deletion
        let err = BookStore::delete(&store, book.id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "Cannot delete book with active borrows"));
    }
}
