//! Demo data: two accounts, three authors and five books
//!
//! Safe to run repeatedly, existing records are left alone.

use chrono::NaiveDate;

use crate::{
    error::AppResult,
    models::{
        author::CreateAuthor,
        book::{BookFilter, CreateBook},
        user::{CreateUser, Role},
    },
    services::Services,
};

struct SeedBook {
    title: &'static str,
    isbn: &'static str,
    description: &'static str,
    published: (i32, u32, u32),
    quantity: i32,
}

struct SeedAuthor {
    name: &'static str,
    bio: &'static str,
    books: &'static [SeedBook],
}

const ACCOUNTS: &[(&str, &str, &str, Role)] = &[
    ("admin@library.com", "admin123", "Admin User", Role::Admin),
    ("user@library.com", "user123", "John Doe", Role::User),
];

const AUTHORS: &[SeedAuthor] = &[
    SeedAuthor {
        name: "J.K. Rowling",
        bio: "British author best known for the Harry Potter fantasy series.",
        books: &[
            SeedBook {
                title: "Harry Potter and the Philosopher's Stone",
                isbn: "9780747532699",
                description: "The first novel in the Harry Potter series.",
                published: (1997, 6, 26),
                quantity: 5,
            },
            SeedBook {
                title: "Harry Potter and the Chamber of Secrets",
                isbn: "9780747538486",
                description: "The second novel in the Harry Potter series.",
                published: (1998, 7, 2),
                quantity: 3,
            },
        ],
    },
    SeedAuthor {
        name: "George Orwell",
        bio: "English novelist, essayist, and critic famous for his novels 1984 and Animal Farm.",
        books: &[
            SeedBook {
                title: "1984",
                isbn: "9780451524935",
                description: "A dystopian social science fiction novel.",
                published: (1949, 6, 8),
                quantity: 4,
            },
            SeedBook {
                title: "Animal Farm",
                isbn: "9780451526342",
                description: "An allegorical novella reflecting events leading up to the Russian Revolution.",
                published: (1945, 8, 17),
                quantity: 2,
            },
        ],
    },
    SeedAuthor {
        name: "Jane Austen",
        bio: "English novelist known for her social commentary and realism.",
        books: &[SeedBook {
            title: "Pride and Prejudice",
            isbn: "9780141439518",
            description: "A romantic novel of manners.",
            published: (1813, 1, 28),
            quantity: 3,
        }],
    },
];

/// What a seed run actually created
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub users: usize,
    pub authors: usize,
    pub books: usize,
}

pub async fn run(services: &Services) -> AppResult<SeedReport> {
    let repository = &services.repository;
    let mut report = SeedReport::default();

    for &(email, password, name, role) in ACCOUNTS {
        if repository.users.get_by_email(email).await?.is_some() {
            tracing::debug!(email, "Account already present");
            continue;
        }
        let user = CreateUser {
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
        };
        services.users.create_with_role(user, role).await?;
        tracing::info!(email, "Created account");
        report.users += 1;
    }

    for seed in AUTHORS {
        let existing = repository
            .authors
            .list(Some(seed.name.to_string()))
            .await?
            .into_iter()
            .find(|entry| entry.author.name == seed.name);

        let author_id = match existing {
            Some(entry) => entry.author.id,
            None => {
                let created = services
                    .authors
                    .create(CreateAuthor {
                        name: seed.name.to_string(),
                        bio: Some(seed.bio.to_string()),
                    })
                    .await?;
                tracing::info!(name = seed.name, "Created author");
                report.authors += 1;
                created.author.id
            }
        };

        for book in seed.books {
            let filter = BookFilter {
                search: Some(book.isbn.to_string()),
                ..Default::default()
            };
            let (found, _) = repository.books.search(&filter).await?;
            if found.iter().any(|entry| entry.book.isbn == book.isbn) {
                continue;
            }

            let (year, month, day) = book.published;
            services
                .books
                .create(CreateBook {
                    title: book.title.to_string(),
                    isbn: book.isbn.to_string(),
                    description: Some(book.description.to_string()),
                    published_at: NaiveDate::from_ymd_opt(year, month, day),
                    quantity: Some(book.quantity),
                    author_id,
                })
                .await?;
            tracing::info!(title = book.title, "Created book");
            report.books += 1;
        }
    }

    Ok(report)
}
