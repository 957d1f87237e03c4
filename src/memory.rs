//! In-process implementation of every store trait. Backs `AppState::in_memory`
//! for tests and database-less local runs; semantics mirror the Postgres
//! stores (case-insensitive emails, version-checked updates, scoped token lookups).

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet, HashMap},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::{
    auth::tokens::{Scope, Token, TokenStore},
    error::StoreError,
    filters::{calculate_metadata, Filters, Metadata, SortDirection},
    movies::{
        repo::MovieStore,
        repo_types::{Movie, NewMovie},
    },
    permissions::{PermissionStore, Permissions, MOVIE_READ, MOVIE_WRITE},
    users::{
        repo::UserStore,
        repo_types::{NewUser, User},
    },
};

/// Codes seeded by the initial migration.
const KNOWN_PERMISSIONS: &[&str] = &[MOVIE_READ, MOVIE_WRITE];

#[derive(Debug, Clone)]
struct StoredToken {
    hash: Vec<u8>,
    user_id: i64,
    expiry: OffsetDateTime,
    scope: Scope,
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    next_user_id: i64,
    tokens: Vec<StoredToken>,
    permissions: HashMap<i64, BTreeSet<String>>,
    movies: BTreeMap<i64, Movie>,
    next_movie_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn email_taken(tables: &Tables, email: &str, except: Option<i64>) -> bool {
    tables
        .users
        .values()
        .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut t = self.tables.lock();
        if email_taken(&t, &user.email, None) {
            return Err(StoreError::DuplicateEmail);
        }
        t.next_user_id += 1;
        let record = User {
            id: t.next_user_id,
            created_at: OffsetDateTime::now_utc(),
            name: user.name,
            email: user.email,
            password: user.password,
            activated: user.activated,
            version: 1,
        };
        t.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<User, StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        self.tables
            .lock()
            .users
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.tables
            .lock()
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, user: &User) -> Result<User, StoreError> {
        let mut t = self.tables.lock();
        if email_taken(&t, &user.email, Some(user.id)) {
            return Err(StoreError::DuplicateEmail);
        }
        let stored = match t.users.get_mut(&user.id) {
            Some(stored) if stored.version == user.version => stored,
            _ => return Err(StoreError::EditConflict),
        };
        stored.name = user.name.clone();
        stored.email = user.email.clone();
        stored.password = user.password.clone();
        stored.activated = user.activated;
        stored.version += 1;
        Ok(stored.clone())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert(&self, token: &Token) -> Result<(), StoreError> {
        let mut t = self.tables.lock();
        if !t.users.contains_key(&token.user_id) {
            return Err(StoreError::NotFound);
        }
        t.tokens.push(StoredToken {
            hash: token.hash.clone(),
            user_id: token.user_id,
            expiry: token.expiry,
            scope: token.scope,
        });
        Ok(())
    }

    async fn get_user_for_token(
        &self,
        scope: Scope,
        hash: &[u8],
        now: OffsetDateTime,
    ) -> Result<User, StoreError> {
        let t = self.tables.lock();
        t.tokens
            .iter()
            .find(|tok| tok.hash == hash && tok.scope == scope && tok.expiry > now)
            .and_then(|tok| t.users.get(&tok.user_id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), StoreError> {
        self.tables
            .lock()
            .tokens
            .retain(|tok| !(tok.user_id == user_id && tok.scope == scope));
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn get_all_for_user(&self, user_id: i64) -> Result<Permissions, StoreError> {
        let codes: Vec<String> = self
            .tables
            .lock()
            .permissions
            .get(&user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        Ok(Permissions::from(codes))
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        let mut t = self.tables.lock();
        let granted = t.permissions.entry(user_id).or_default();
        for code in codes.iter().filter(|c| KNOWN_PERMISSIONS.contains(*c)) {
            granted.insert(code.to_string());
        }
        Ok(())
    }
}

fn words(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn title_matches(title: &str, query: &str) -> bool {
    let title_words: BTreeSet<String> = words(title).collect();
    words(query).all(|w| title_words.contains(&w))
}

fn compare_by(column: &str, a: &Movie, b: &Movie) -> Ordering {
    match column {
        "title" => a.title.cmp(&b.title),
        "year" => a.year.cmp(&b.year),
        "runtime" => a.runtime.cmp(&b.runtime),
        _ => a.id.cmp(&b.id),
    }
}

#[async_trait]
impl MovieStore for MemoryStore {
    async fn insert(&self, movie: NewMovie) -> Result<Movie, StoreError> {
        let mut t = self.tables.lock();
        t.next_movie_id += 1;
        let record = Movie {
            id: t.next_movie_id,
            created_at: OffsetDateTime::now_utc(),
            title: movie.title,
            year: movie.year,
            runtime: movie.runtime,
            genres: movie.genres,
            version: 1,
        };
        t.movies.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<Movie, StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        self.tables
            .lock()
            .movies
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, movie: &Movie) -> Result<Movie, StoreError> {
        let mut t = self.tables.lock();
        let stored = match t.movies.get_mut(&movie.id) {
            Some(stored) if stored.version == movie.version => stored,
            _ => return Err(StoreError::EditConflict),
        };
        stored.title = movie.title.clone();
        stored.year = movie.year;
        stored.runtime = movie.runtime;
        stored.genres = movie.genres.clone();
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.tables
            .lock()
            .movies
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn list(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), StoreError> {
        let column = filters
            .sort_column()
            .ok_or_else(|| StoreError::InvalidSort(filters.sort.clone()))?;
        let direction = filters.sort_direction();

        let mut matched: Vec<Movie> = self
            .tables
            .lock()
            .movies
            .values()
            .filter(|m| title_matches(&m.title, title))
            .filter(|m| genres.iter().all(|g| m.genres.contains(g)))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let primary = compare_by(column, a, b);
            let primary = match direction {
                SortDirection::Asc => primary,
                SortDirection::Desc => primary.reverse(),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });

        let total = matched.len() as i64;
        let page: Vec<Movie> = matched
            .into_iter()
            .skip(filters.offset() as usize)
            .take(filters.limit() as usize)
            .collect();

        // Mirrors the windowed count: an out-of-range page reports nothing.
        let total = if page.is_empty() { 0 } else { total };
        Ok((page, calculate_metadata(total, filters.page, filters.page_size)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::password::Password, movies::runtime::Runtime, movies::repo_types::SORT_SAFELIST};

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Test".into(),
            email: email.into(),
            password: Password::from_hash("hash".into()),
            activated: false,
        }
    }

    fn new_movie(title: &str, year: i32, genres: &[&str]) -> NewMovie {
        NewMovie {
            title: title.into(),
            year,
            runtime: Runtime(100),
            genres: genres.iter().map(|g| g.to_string()).collect(),
        }
    }

    fn filters(page: i64, page_size: i64, sort: &str) -> Filters {
        Filters {
            page,
            page_size,
            sort: sort.into(),
            sort_safelist: SORT_SAFELIST,
        }
    }

    #[tokio::test]
    async fn emails_are_unique_case_insensitively() {
        let store = MemoryStore::new();
        UserStore::insert(&store, new_user("bob@example.com")).await.unwrap();
        let err = UserStore::insert(&store, new_user("BOB@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[tokio::test]
    async fn stale_user_update_conflicts() {
        let store = MemoryStore::new();
        let user = UserStore::insert(&store, new_user("carol@example.com")).await.unwrap();

        let mut first = user.clone();
        first.activated = true;
        let updated = UserStore::update(&store, &first).await.unwrap();
        assert_eq!(updated.version, user.version + 1);

        let mut second = user.clone();
        second.name = "Stale".into();
        assert!(matches!(
            UserStore::update(&store, &second).await,
            Err(StoreError::EditConflict)
        ));
        assert!(UserStore::get(&store, user.id).await.unwrap().activated);
    }

    #[tokio::test]
    async fn unknown_permission_codes_are_ignored() {
        let store = MemoryStore::new();
        store.add_for_user(1, &[MOVIE_READ, "movie:admin"]).await.unwrap();
        store.add_for_user(1, &[MOVIE_READ]).await.unwrap();
        let perms = store.get_all_for_user(1).await.unwrap();
        assert_eq!(perms.codes(), &[MOVIE_READ.to_string()]);
    }

    #[tokio::test]
    async fn list_filters_sorts_and_paginates() {
        let store = MemoryStore::new();
        MovieStore::insert(&store, new_movie("The Breakfast Club", 1985, &["comedy", "drama"])).await.unwrap();
        MovieStore::insert(&store, new_movie("Black Panther", 2018, &["action", "adventure"])).await.unwrap();
        MovieStore::insert(&store, new_movie("Moana", 2016, &["animation", "adventure"])).await.unwrap();
        MovieStore::insert(&store, new_movie("The Club", 2016, &["drama"])).await.unwrap();

        let (movies, meta) = store.list("club", &[], &filters(1, 10, "id")).await.unwrap();
        assert_eq!(movies.len(), 2);
        assert_eq!(meta.total_records, 2);

        let adventure = vec!["adventure".to_string()];
        let (movies, _) = store.list("", &adventure, &filters(1, 10, "-year")).await.unwrap();
        let titles: Vec<_> = movies.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, ["Black Panther", "Moana"]);

        // Equal years fall back to id ascending.
        let (movies, _) = store.list("", &[], &filters(1, 10, "-year")).await.unwrap();
        let ids: Vec<_> = movies.iter().map(|m| m.id).collect();
        assert_eq!(ids, [2, 3, 4, 1]);

        let (movies, meta) = store.list("", &[], &filters(2, 3, "id")).await.unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(meta.last_page, 2);
        assert_eq!(meta.current_page, 2);
    }

    #[tokio::test]
    async fn list_rejects_unsafe_sort() {
        let store = MemoryStore::new();
        let f = Filters {
            page: 1,
            page_size: 10,
            sort: "year; DROP TABLE movies".into(),
            sort_safelist: SORT_SAFELIST,
        };
        assert!(matches!(
            store.list("", &[], &f).await,
            Err(StoreError::InvalidSort(_))
        ));
    }

    #[tokio::test]
    async fn delete_missing_movie_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(MovieStore::delete(&store, 42).await, Err(StoreError::NotFound)));
    }
}
