use super::{DbRepository, flag, now_text, parse_timestamp};
use crate::error::{DbError, conflict_on_unique};
use crate::password::{self, DEFAULT_ITERATIONS};
use core_types::User;
use sqlx::Row;
use sqlx::any::AnyRow;

fn user_from_row(row: &AnyRow) -> Result<User, DbError> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        is_active: row.try_get::<i64, _>("is_active")? != 0,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn normalize_username(raw: &str) -> Result<String, DbError> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(DbError::Validation("username must not be empty".to_string()));
    }
    Ok(username.to_string())
}

fn check_password(password: &str) -> Result<(), DbError> {
    if password.is_empty() {
        return Err(DbError::Validation("password must not be empty".to_string()));
    }
    Ok(())
}

impl DbRepository {
    /// Creates an active user. Usernames are unique.
    pub async fn create_user(&self, username: &str, password: &str) -> Result<User, DbError> {
        self.create_user_with_iterations(username, password, DEFAULT_ITERATIONS)
            .await
    }

    pub(crate) async fn create_user_with_iterations(
        &self,
        username: &str,
        password: &str,
        iterations: u32,
    ) -> Result<User, DbError> {
        let username = normalize_username(username)?;
        check_password(password)?;
        let hash = password::hash_password_with(password, iterations);

        let pool = self.db.pool().await;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (username, password_hash, is_active, created_at) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(username.clone())
        .bind(hash)
        .bind(flag(true))
        .bind(now_text())
        .fetch_one(&*pool)
        .await
        .map_err(|e| conflict_on_unique(e, || format!("user '{username}' already exists")))?;
        drop(pool);

        tracing::info!(user_id = id, %username, "User created.");
        self.get_user(id).await
    }

    /// Returns the user if the credentials match an active account.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Option<User>, DbError> {
        let pool = self.db.pool().await;
        let row = sqlx::query(
            "SELECT id, username, password_hash, is_active, created_at FROM users WHERE username = $1",
        )
        .bind(username.trim().to_string())
        .fetch_optional(&*pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let hash: String = row.try_get("password_hash")?;
        let user = user_from_row(&row)?;
        if user.is_active && password::verify_password(password, &hash) {
            Ok(Some(user))
        } else {
            tracing::debug!(username = %user.username, "Rejected login attempt.");
            Ok(None)
        }
    }

    pub async fn get_user(&self, id: i64) -> Result<User, DbError> {
        let pool = self.db.pool().await;
        let row = sqlx::query("SELECT id, username, is_active, created_at FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&*pool)
            .await?;
        match row {
            Some(row) => user_from_row(&row),
            None => Err(DbError::NotFound(format!("user {id}"))),
        }
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<User>, DbError> {
        let pool = self.db.pool().await;
        let row = sqlx::query(
            "SELECT id, username, is_active, created_at FROM users WHERE username = $1",
        )
        .bind(username.trim().to_string())
        .fetch_optional(&*pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn list_users(&self) -> Result<Vec<User>, DbError> {
        let pool = self.db.pool().await;
        let rows = sqlx::query("SELECT id, username, is_active, created_at FROM users ORDER BY username")
            .fetch_all(&*pool)
            .await?;
        rows.iter().map(user_from_row).collect()
    }

    /// Replaces the password of an existing user.
    pub async fn set_password(&self, username: &str, password: &str) -> Result<(), DbError> {
        check_password(password)?;
        let hash = password::hash_password(password);
        let pool = self.db.pool().await;
        let affected = sqlx::query("UPDATE users SET password_hash = $1 WHERE username = $2")
            .bind(hash)
            .bind(username.trim().to_string())
            .execute(&*pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(DbError::NotFound(format!("user '{}'", username.trim())));
        }
        tracing::info!(username = %username.trim(), "Password changed.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::DbError;
    use crate::repository::test_support::{repository, user};

    #[tokio::test]
    async fn authenticate_checks_the_password() {
        let (repo, _dir) = repository().await;
        let alice = user(&repo, "alice").await;

        let found = repo.authenticate("alice", "secret").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(alice.id));
        assert!(repo.authenticate("alice", "wrong").await.unwrap().is_none());
        assert!(repo.authenticate("bob", "secret").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let (repo, _dir) = repository().await;
        user(&repo, "alice").await;
        let err = repo
            .create_user_with_iterations(" alice ", "other", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)), "{err}");
    }

    #[tokio::test]
    async fn set_password_replaces_credentials() {
        let (repo, _dir) = repository().await;
        user(&repo, "alice").await;
        repo.set_password("alice", "new-secret").await.unwrap();

        assert!(repo.authenticate("alice", "secret").await.unwrap().is_none());
        assert!(repo.authenticate("alice", "new-secret").await.unwrap().is_some());
        assert!(matches!(
            repo.set_password("nobody", "x").await,
            Err(DbError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn blank_credentials_are_rejected() {
        let (repo, _dir) = repository().await;
        assert!(matches!(
            repo.create_user("  ", "pw").await,
            Err(DbError::Validation(_))
        ));
        assert!(matches!(
            repo.create_user("carol", "").await,
            Err(DbError::Validation(_))
        ));
    }
}
