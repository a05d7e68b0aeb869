//! SQLite database operations
//!
//! All database access goes through this module.
//! Multi-statement mutations (edge toggles plus their notification) run in
//! `BEGIN IMMEDIATE` transactions so SQLite serializes concurrent writers.

use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::AppError;

/// Wrong guesses allowed against one phone verification code
pub const MAX_OTP_ATTEMPTS: i64 = 5;

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db_error) if db_error.is_unique_violation())
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Start the shared post-summary SELECT for one viewer.
///
/// The viewer account ID is bound three times (liked, saved, saved_at).
/// Anonymous viewers pass an empty string, which never matches.
fn post_summary_query(viewer_account_id: &str) -> QueryBuilder<'_, Sqlite> {
    let mut query_builder = QueryBuilder::<Sqlite>::new(
        r#"
        SELECT
            p.id, p.account_id, a.username, pr.display_name, pr.avatar_key,
            p.title, p.image_key, p.body, p.created_at,
            (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count,
            (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count,
            EXISTS (SELECT 1 FROM likes vl WHERE vl.post_id = p.id AND vl.account_id = "#,
    );
    query_builder.push_bind(viewer_account_id);
    query_builder.push(
        r#") AS liked,
            EXISTS (SELECT 1 FROM saved_posts vs WHERE vs.post_id = p.id AND vs.account_id = "#,
    );
    query_builder.push_bind(viewer_account_id);
    query_builder.push(
        r#") AS saved,
            (
                SELECT s.saved_at FROM saved_posts s
                WHERE s.post_id = p.id AND s.account_id = "#,
    );
    query_builder.push_bind(viewer_account_id);
    query_builder.push(
        r#"
                ORDER BY s.saved_at DESC
                LIMIT 1
            ) AS saved_at
        FROM posts p
        INNER JOIN accounts a ON a.id = p.account_id
        LEFT JOIN profiles pr ON pr.account_id = p.account_id
        "#,
    );
    query_builder
}

/// Append the keyset cursor join/condition for newest-first post listings.
///
/// Must be called right after [`post_summary_query`] so the join lands
/// before the WHERE clause. Falls back to an ID comparison when the cursor
/// post no longer exists.
fn push_post_cursor<'a>(query_builder: &mut QueryBuilder<'a, Sqlite>, max_id: Option<&'a str>) {
    match max_id {
        Some(max_id) => {
            query_builder.push(" LEFT JOIN posts cp ON cp.id = ");
            query_builder.push_bind(max_id);
            query_builder.push(
                " WHERE ((cp.id IS NOT NULL AND (p.created_at < cp.created_at OR (p.created_at = cp.created_at AND p.id < cp.id))) OR (cp.id IS NULL AND p.id < ",
            );
            query_builder.push_bind(max_id);
            query_builder.push("))");
        }
        None => {
            query_builder.push(" WHERE 1 = 1");
        }
    }
}

async fn insert_notification_on(
    conn: &mut SqliteConnection,
    actor_profile_id: &str,
    recipient_profile_id: &str,
    post_id: Option<&str>,
    kind: NotificationKind,
) -> Result<Notification, AppError> {
    let notification = Notification {
        id: EntityId::new().0,
        actor_profile_id: actor_profile_id.to_string(),
        recipient_profile_id: recipient_profile_id.to_string(),
        post_id: post_id.map(ToOwned::to_owned),
        kind: kind.as_str().to_string(),
        read: false,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO notifications (
            id, actor_profile_id, recipient_profile_id, post_id, kind, read, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&notification.id)
    .bind(&notification.actor_profile_id)
    .bind(&notification.recipient_profile_id)
    .bind(&notification.post_id)
    .bind(&notification.kind)
    .bind(notification.read)
    .bind(notification.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(notification)
}

/// Resolve a post's owner profile ID inside a transaction.
async fn post_owner_profile_id(
    conn: &mut SqliteConnection,
    post_id: &str,
) -> Result<Option<String>, AppError> {
    let owner = sqlx::query_scalar::<_, String>(
        r#"
        SELECT pr.id FROM posts p
        INNER JOIN profiles pr ON pr.account_id = p.account_id
        WHERE p.id = ?
        "#,
    )
    .bind(post_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(owner)
}

/// A `BEGIN IMMEDIATE` transaction on a pooled connection.
///
/// The connection is only handed back to the pool once the transaction is
/// closed. If the owning future is dropped before [`ImmediateTx::finish`]
/// (client disconnect, timeout), the rollback runs on a spawned task so the
/// connection never returns to the pool holding the write lock.
struct ImmediateTx {
    conn: Option<PoolConnection<Sqlite>>,
}

impl ImmediateTx {
    async fn begin(pool: &SqlitePool) -> Result<Self, AppError> {
        let conn = pool.acquire().await?;
        let mut tx = Self { conn: Some(conn) };
        if let Err(error) = sqlx::query("BEGIN IMMEDIATE").execute(&mut *tx).await {
            // BEGIN did not take effect; the connection is clean
            tx.conn.take();
            return Err(error.into());
        }
        Ok(tx)
    }

    /// COMMIT on success, ROLLBACK on any error.
    ///
    /// A failed COMMIT or ROLLBACK leaves the connection to `Drop`.
    async fn finish<T>(mut self, result: Result<T, AppError>) -> Result<T, AppError> {
        match result {
            Ok(value) => {
                sqlx::query("COMMIT").execute(&mut *self).await?;
                self.conn.take();
                Ok(value)
            }
            Err(error) => {
                if sqlx::query("ROLLBACK").execute(&mut *self).await.is_ok() {
                    self.conn.take();
                }
                Err(error)
            }
        }
    }
}

impl std::ops::Deref for ImmediateTx {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_deref()
            .expect("connection is present until the transaction is finished")
    }
}

impl std::ops::DerefMut for ImmediateTx {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_deref_mut()
            .expect("connection is present until the transaction is finished")
    }
}

impl Drop for ImmediateTx {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(error) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                        tracing::warn!(%error, "Rollback of abandoned transaction failed, closing connection");
                        drop(conn.detach());
                    }
                });
            }
            // Closing the connection discards the open transaction
            Err(_) => drop(conn.detach()),
        }
    }
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
        use std::time::Duration;

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePool::connect_with(options).await?;

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!(path = %path.display(), "Database connected and migrated successfully");

        Ok(Self { pool })
    }

    /// Acquire a pooled connection and open an IMMEDIATE transaction on it.
    async fn begin_immediate(&self) -> Result<ImmediateTx, AppError> {
        ImmediateTx::begin(&self.pool).await
    }

    // =========================================================================
    // Accounts and profiles
    // =========================================================================

    /// Create account, profile and self-follow edge as one unit.
    ///
    /// # Errors
    /// `Validation` when the username or phone number is already taken.
    /// Nothing is persisted on failure.
    pub async fn register_account(
        &self,
        new_account: &NewAccount,
    ) -> Result<(Account, Profile), AppError> {
        let mut conn = self.begin_immediate().await?;

        let result: Result<(Account, Profile), AppError> = async {
            let username_taken: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE username = ?)")
                    .bind(&new_account.username)
                    .fetch_one(&mut *conn)
                    .await?;
            if username_taken {
                return Err(AppError::Validation(
                    "User with this username already exists, please try a unique username"
                        .to_string(),
                ));
            }

            if let Some(phone_number) = &new_account.phone_number {
                let phone_taken: bool = sqlx::query_scalar(
                    "SELECT EXISTS (SELECT 1 FROM profiles WHERE phone_number = ?)",
                )
                .bind(phone_number)
                .fetch_one(&mut *conn)
                .await?;
                if phone_taken {
                    return Err(AppError::Validation(
                        "This phone number is already registered".to_string(),
                    ));
                }
            }

            let now = Utc::now();
            let account = Account {
                id: EntityId::new().0,
                username: new_account.username.clone(),
                email: new_account.email.clone(),
                password_hash: new_account.password_hash.clone(),
                created_at: now,
            };

            sqlx::query(
                "INSERT INTO accounts (id, username, email, password_hash, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&account.id)
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(account.created_at)
            .execute(&mut *conn)
            .await
            .map_err(|error| {
                if is_unique_violation(&error) {
                    AppError::Validation(
                        "User with this username already exists, please try a unique username"
                            .to_string(),
                    )
                } else {
                    error.into()
                }
            })?;

            let profile = Profile {
                id: EntityId::new().0,
                account_id: account.id.clone(),
                display_name: None,
                gender: None,
                date_of_birth: None,
                avatar_key: None,
                bio: None,
                phone_number: new_account.phone_number.clone(),
                phone_verified: false,
                created_at: now,
                updated_at: now,
            };

            sqlx::query(
                r#"
                INSERT INTO profiles (
                    id, account_id, display_name, gender, date_of_birth, avatar_key, bio,
                    phone_number, phone_verified, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&profile.id)
            .bind(&profile.account_id)
            .bind(&profile.display_name)
            .bind(&profile.gender)
            .bind(profile.date_of_birth)
            .bind(&profile.avatar_key)
            .bind(&profile.bio)
            .bind(&profile.phone_number)
            .bind(profile.phone_verified)
            .bind(profile.created_at)
            .bind(profile.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(|error| {
                if is_unique_violation(&error) {
                    AppError::Validation("This phone number is already registered".to_string())
                } else {
                    error.into()
                }
            })?;

            // Every profile sees its own posts through the graph.
            sqlx::query(
                "INSERT INTO follows (id, follower_profile_id, target_profile_id, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(EntityId::new().0)
            .bind(&profile.id)
            .bind(&profile.id)
            .bind(now)
            .execute(&mut *conn)
            .await?;

            Ok((account, profile))
        }
        .await;

        conn.finish(result).await
    }

    /// Get account by ID
    pub async fn get_account(&self, id: &str) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    /// Get account by exact username
    pub async fn get_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    /// Get the oldest account registered with an email (case-insensitive)
    pub async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE email = ? COLLATE NOCASE ORDER BY created_at ASC LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Usernames containing `fragment` (case-insensitive), at most `limit`
    pub async fn suggest_usernames(
        &self,
        fragment: &str,
        limit: usize,
    ) -> Result<Vec<String>, AppError> {
        let pattern = format!("%{}%", escape_like(fragment));
        let usernames = sqlx::query_scalar::<_, String>(
            "SELECT username FROM accounts WHERE username LIKE ? ESCAPE '\\' ORDER BY username LIMIT ?",
        )
        .bind(pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(usernames)
    }

    /// Get profile by owning account ID
    pub async fn get_profile_by_account(
        &self,
        account_id: &str,
    ) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE account_id = ?")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(profile)
    }

    /// Profile with graph counts as seen by `viewer_profile_id`
    pub async fn get_profile_view(
        &self,
        account_id: &str,
        viewer_profile_id: &str,
    ) -> Result<Option<ProfileView>, AppError> {
        let profile = sqlx::query_as::<_, ProfileView>(
            r#"
            SELECT
                pr.id, pr.account_id, a.username, pr.display_name, pr.gender,
                pr.date_of_birth, pr.avatar_key, pr.bio,
                (SELECT COUNT(*) FROM follows f WHERE f.target_profile_id = pr.id) AS follower_count,
                (SELECT COUNT(*) FROM follows f WHERE f.follower_profile_id = pr.id) AS following_count,
                EXISTS (
                    SELECT 1 FROM follows f
                    WHERE f.follower_profile_id = ? AND f.target_profile_id = pr.id
                ) AS followed_by_viewer
            FROM profiles pr
            INNER JOIN accounts a ON a.id = pr.account_id
            WHERE pr.account_id = ?
            "#,
        )
        .bind(viewer_profile_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    /// All profiles except the one owned by `excluded_account_id`
    pub async fn list_profiles_except(
        &self,
        excluded_account_id: &str,
    ) -> Result<Vec<ProfileCard>, AppError> {
        let profiles = sqlx::query_as::<_, ProfileCard>(
            r#"
            SELECT pr.id, pr.account_id, a.username, pr.display_name, pr.avatar_key
            FROM profiles pr
            INNER JOIN accounts a ON a.id = pr.account_id
            WHERE pr.account_id != ?
            ORDER BY a.username ASC
            "#,
        )
        .bind(excluded_account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(profiles)
    }

    /// Patch profile fields by profile ID.
    ///
    /// # Returns
    /// `true` if updated, `false` if no matching profile row exists.
    pub async fn patch_profile(
        &self,
        profile_id: &str,
        patch: &ProfilePatch,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut query_builder = QueryBuilder::<Sqlite>::new("UPDATE profiles SET updated_at = ");
        query_builder.push_bind(updated_at);

        if let Some(display_name) = &patch.display_name {
            query_builder.push(", display_name = ");
            query_builder.push_bind(display_name.clone());
        }
        if let Some(gender) = &patch.gender {
            query_builder.push(", gender = ");
            query_builder.push_bind(gender.map(|gender| gender.as_str()));
        }
        if let Some(date_of_birth) = &patch.date_of_birth {
            query_builder.push(", date_of_birth = ");
            query_builder.push_bind(*date_of_birth);
        }
        if let Some(bio) = &patch.bio {
            query_builder.push(", bio = ");
            query_builder.push_bind(bio.clone());
        }

        query_builder.push(" WHERE id = ");
        query_builder.push_bind(profile_id);

        let result = query_builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    /// Swap the avatar key only if it still equals `expected_current_key`.
    ///
    /// # Returns
    /// `true` if updated, `false` on a concurrent change or missing profile.
    pub async fn update_avatar_key_if_matches(
        &self,
        profile_id: &str,
        expected_current_key: Option<&str>,
        avatar_key: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET avatar_key = ?, updated_at = ?
            WHERE id = ? AND avatar_key IS ?
            "#,
        )
        .bind(avatar_key)
        .bind(updated_at)
        .bind(profile_id)
        .bind(expected_current_key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Follow graph
    // =========================================================================

    /// Toggle the follow edge `follower -> target` and notify the target.
    ///
    /// Returns the edge state after the toggle and the emitted notification
    /// (`follow` when created, `unfollow` when removed).
    pub async fn toggle_follow(
        &self,
        follower_profile_id: &str,
        target_profile_id: &str,
    ) -> Result<(bool, Notification), AppError> {
        let mut conn = self.begin_immediate().await?;

        let result: Result<(bool, Notification), AppError> = async {
            let inserted = sqlx::query(
                r#"
                INSERT INTO follows (id, follower_profile_id, target_profile_id, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (follower_profile_id, target_profile_id) DO NOTHING
                "#,
            )
            .bind(EntityId::new().0)
            .bind(follower_profile_id)
            .bind(target_profile_id)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?
            .rows_affected()
                == 1;

            let kind = if inserted {
                NotificationKind::Follow
            } else {
                sqlx::query(
                    "DELETE FROM follows WHERE follower_profile_id = ? AND target_profile_id = ?",
                )
                .bind(follower_profile_id)
                .bind(target_profile_id)
                .execute(&mut *conn)
                .await?;
                NotificationKind::Unfollow
            };

            let notification = insert_notification_on(
                &mut conn,
                follower_profile_id,
                target_profile_id,
                None,
                kind,
            )
            .await?;

            Ok((inserted, notification))
        }
        .await;

        conn.finish(result).await
    }

    /// Count follow edges leaving and entering a profile
    ///
    /// # Returns
    /// `(following, followers)`
    pub async fn count_follow_edges(&self, profile_id: &str) -> Result<(i64, i64), AppError> {
        let following: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE follower_profile_id = ?")
                .bind(profile_id)
                .fetch_one(&self.pool)
                .await?;
        let followers: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE target_profile_id = ?")
                .bind(profile_id)
                .fetch_one(&self.pool)
                .await?;

        Ok((following, followers))
    }

    // =========================================================================
    // Posts
    // =========================================================================

    /// Insert post
    pub async fn insert_post(&self, post: &Post) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, account_id, title, image_key, body, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.account_id)
        .bind(&post.title)
        .bind(&post.image_key)
        .bind(&post.body)
        .bind(post.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get post by ID
    pub async fn get_post(&self, id: &str) -> Result<Option<Post>, AppError> {
        let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(post)
    }

    /// Delete a post owned by `account_id`
    ///
    /// Likes, comments and saves cascade; notifications keep a NULL post.
    ///
    /// # Returns
    /// `true` if a row was deleted.
    pub async fn delete_post(&self, id: &str, account_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ? AND account_id = ?")
            .bind(id)
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Single post summary for a viewer
    pub async fn get_post_summary(
        &self,
        id: &str,
        viewer_account_id: &str,
    ) -> Result<Option<PostSummary>, AppError> {
        let mut query_builder = post_summary_query(viewer_account_id);
        query_builder.push(" WHERE p.id = ");
        query_builder.push_bind(id);

        let post = query_builder
            .build_query_as::<PostSummary>()
            .fetch_optional(&self.pool)
            .await?;

        Ok(post)
    }

    /// All posts, newest first (home feed)
    pub async fn get_home_feed(
        &self,
        viewer_account_id: &str,
        limit: usize,
        max_id: Option<&str>,
    ) -> Result<Vec<PostSummary>, AppError> {
        let mut query_builder = post_summary_query(viewer_account_id);
        push_post_cursor(&mut query_builder, max_id);
        query_builder.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ");
        query_builder.push_bind(limit as i64);

        let posts = query_builder
            .build_query_as::<PostSummary>()
            .fetch_all(&self.pool)
            .await?;

        Ok(posts)
    }

    /// Posts by one account, newest first (profile feed)
    pub async fn get_account_feed(
        &self,
        account_id: &str,
        viewer_account_id: &str,
        limit: usize,
        max_id: Option<&str>,
    ) -> Result<Vec<PostSummary>, AppError> {
        let mut query_builder = post_summary_query(viewer_account_id);
        push_post_cursor(&mut query_builder, max_id);
        query_builder.push(" AND p.account_id = ");
        query_builder.push_bind(account_id);
        query_builder.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ");
        query_builder.push_bind(limit as i64);

        let posts = query_builder
            .build_query_as::<PostSummary>()
            .fetch_all(&self.pool)
            .await?;

        Ok(posts)
    }

    /// Posts in the viewer's saved set, most recently saved first
    pub async fn get_saved_feed(
        &self,
        viewer_account_id: &str,
    ) -> Result<Vec<PostSummary>, AppError> {
        let mut query_builder = post_summary_query(viewer_account_id);
        query_builder.push(" WHERE p.id IN (SELECT post_id FROM saved_posts WHERE account_id = ");
        query_builder.push_bind(viewer_account_id);
        query_builder.push(") ORDER BY saved_at DESC, p.id DESC");

        let posts = query_builder
            .build_query_as::<PostSummary>()
            .fetch_all(&self.pool)
            .await?;

        Ok(posts)
    }

    // =========================================================================
    // Likes / Saved posts
    // =========================================================================

    /// Toggle the like edge and notify the post owner when it is created.
    ///
    /// # Errors
    /// `NotFound` if the post does not exist.
    pub async fn toggle_like(
        &self,
        account_id: &str,
        actor_profile_id: &str,
        post_id: &str,
    ) -> Result<ToggleResult, AppError> {
        let mut conn = self.begin_immediate().await?;

        let result: Result<ToggleResult, AppError> = async {
            let owner_profile_id = post_owner_profile_id(&mut conn, post_id)
                .await?
                .ok_or(AppError::NotFound)?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO likes (id, account_id, post_id, created_at) VALUES (?, ?, ?, ?)
                ON CONFLICT (account_id, post_id) DO NOTHING
                "#,
            )
            .bind(EntityId::new().0)
            .bind(account_id)
            .bind(post_id)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?
            .rows_affected()
                == 1;

            let notification = if inserted {
                Some(
                    insert_notification_on(
                        &mut conn,
                        actor_profile_id,
                        &owner_profile_id,
                        Some(post_id),
                        NotificationKind::Like,
                    )
                    .await?,
                )
            } else {
                sqlx::query("DELETE FROM likes WHERE account_id = ? AND post_id = ?")
                    .bind(account_id)
                    .bind(post_id)
                    .execute(&mut *conn)
                    .await?;
                None
            };

            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM likes WHERE post_id = ?")
                .bind(post_id)
                .fetch_one(&mut *conn)
                .await?;

            Ok(ToggleResult {
                active: inserted,
                count,
                notification,
            })
        }
        .await;

        conn.finish(result).await
    }

    /// Toggle the saved-post edge. Never notifies.
    ///
    /// # Errors
    /// `NotFound` if the post does not exist.
    pub async fn toggle_saved_post(
        &self,
        account_id: &str,
        post_id: &str,
    ) -> Result<ToggleResult, AppError> {
        let mut conn = self.begin_immediate().await?;

        let result: Result<ToggleResult, AppError> = async {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM posts WHERE id = ?)")
                .bind(post_id)
                .fetch_one(&mut *conn)
                .await?;
            if !exists {
                return Err(AppError::NotFound);
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO saved_posts (id, account_id, post_id, saved_at) VALUES (?, ?, ?, ?)
                ON CONFLICT (account_id, post_id) DO NOTHING
                "#,
            )
            .bind(EntityId::new().0)
            .bind(account_id)
            .bind(post_id)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?
            .rows_affected()
                == 1;

            if !inserted {
                sqlx::query("DELETE FROM saved_posts WHERE account_id = ? AND post_id = ?")
                    .bind(account_id)
                    .bind(post_id)
                    .execute(&mut *conn)
                    .await?;
            }

            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM saved_posts WHERE post_id = ?")
                    .bind(post_id)
                    .fetch_one(&mut *conn)
                    .await?;

            Ok(ToggleResult {
                active: inserted,
                count,
                notification: None,
            })
        }
        .await;

        conn.finish(result).await
    }

    // =========================================================================
    // Comments
    // =========================================================================

    /// Append a comment and notify the post owner (even when the owner comments).
    ///
    /// # Errors
    /// `NotFound` if the post does not exist.
    pub async fn insert_comment(
        &self,
        account_id: &str,
        actor_profile_id: &str,
        post_id: &str,
        body: &str,
    ) -> Result<(Comment, Notification), AppError> {
        let mut conn = self.begin_immediate().await?;

        let result: Result<(Comment, Notification), AppError> = async {
            let owner_profile_id = post_owner_profile_id(&mut conn, post_id)
                .await?
                .ok_or(AppError::NotFound)?;

            let comment = Comment {
                id: EntityId::new().0,
                account_id: account_id.to_string(),
                post_id: post_id.to_string(),
                body: body.to_string(),
                created_at: Utc::now(),
            };

            sqlx::query(
                "INSERT INTO comments (id, account_id, post_id, body, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&comment.id)
            .bind(&comment.account_id)
            .bind(&comment.post_id)
            .bind(&comment.body)
            .bind(comment.created_at)
            .execute(&mut *conn)
            .await?;

            let notification = insert_notification_on(
                &mut conn,
                actor_profile_id,
                &owner_profile_id,
                Some(post_id),
                NotificationKind::Comment,
            )
            .await?;

            Ok((comment, notification))
        }
        .await;

        conn.finish(result).await
    }

    /// Comments on a post, oldest first
    pub async fn get_comments(&self, post_id: &str) -> Result<Vec<CommentView>, AppError> {
        let comments = sqlx::query_as::<_, CommentView>(
            r#"
            SELECT c.id, c.account_id, a.username, c.post_id, c.body, c.created_at
            FROM comments c
            INNER JOIN accounts a ON a.id = c.account_id
            WHERE c.post_id = ?
            ORDER BY c.created_at ASC, c.id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(comments)
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Unread notifications for a recipient, newest first
    pub async fn get_unread_notifications(
        &self,
        recipient_profile_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<NotificationView>, AppError> {
        let mut query_builder = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT
                n.id, n.kind, n.read, n.created_at,
                n.actor_profile_id, ap.account_id AS actor_account_id, aa.username AS actor_username,
                n.recipient_profile_id, n.post_id, p.title AS post_title
            FROM notifications n
            INNER JOIN profiles ap ON ap.id = n.actor_profile_id
            INNER JOIN accounts aa ON aa.id = ap.account_id
            LEFT JOIN posts p ON p.id = n.post_id
            WHERE n.read = 0 AND n.recipient_profile_id = "#,
        );
        query_builder.push_bind(recipient_profile_id);
        query_builder.push(" ORDER BY n.created_at DESC, n.id DESC");
        if let Some(limit) = limit {
            query_builder.push(" LIMIT ");
            query_builder.push_bind(limit as i64);
        }

        let notifications = query_builder
            .build_query_as::<NotificationView>()
            .fetch_all(&self.pool)
            .await?;

        Ok(notifications)
    }

    /// Count unread notifications for a recipient
    pub async fn count_unread_notifications(
        &self,
        recipient_profile_id: &str,
    ) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_profile_id = ? AND read = 0",
        )
        .bind(recipient_profile_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Mark notification as read
    ///
    /// # Returns
    /// `true` if the notification exists (already-read rows count as found).
    pub async fn mark_notification_read(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Phone verification codes
    // =========================================================================

    /// Store a hashed phone verification code
    pub async fn insert_phone_otp(&self, otp: &PhoneOtp) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO phone_otps (
                id, profile_id, phone_number, code_hash, created_at, expires_at, consumed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&otp.id)
        .bind(&otp.profile_id)
        .bind(&otp.phone_number)
        .bind(&otp.code_hash)
        .bind(otp.created_at)
        .bind(otp.expires_at)
        .bind(otp.consumed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete a stored code (used when delivery failed)
    pub async fn delete_phone_otp(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM phone_otps WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Consume the newest live code if it matches and mark the phone verified.
    ///
    /// A mismatch counts against the newest code; after [`MAX_OTP_ATTEMPTS`]
    /// misses it is consumed and a new code must be requested.
    ///
    /// # Returns
    /// `true` when the code matched and was consumed.
    pub async fn consume_phone_otp(
        &self,
        profile_id: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut conn = self.begin_immediate().await?;

        let result: Result<bool, AppError> = async {
            let latest = sqlx::query_as::<_, PhoneOtp>(
                r#"
                SELECT * FROM phone_otps
                WHERE profile_id = ? AND consumed_at IS NULL AND expires_at > ?
                ORDER BY created_at DESC
                LIMIT 1
                "#,
            )
            .bind(profile_id)
            .bind(now)
            .fetch_optional(&mut *conn)
            .await?;

            let Some(latest) = latest else {
                return Ok(false);
            };
            if latest.code_hash != code_hash {
                // The code is burned once the guess budget is spent
                sqlx::query(
                    r#"
                    UPDATE phone_otps
                    SET failed_attempts = failed_attempts + 1,
                        consumed_at = CASE WHEN failed_attempts + 1 >= ? THEN ? ELSE consumed_at END
                    WHERE id = ?
                    "#,
                )
                .bind(MAX_OTP_ATTEMPTS)
                .bind(now)
                .bind(&latest.id)
                .execute(&mut *conn)
                .await?;
                return Ok(false);
            }

            sqlx::query("UPDATE phone_otps SET consumed_at = ? WHERE id = ?")
                .bind(now)
                .bind(&latest.id)
                .execute(&mut *conn)
                .await?;

            sqlx::query(
                "UPDATE profiles SET phone_verified = 1, updated_at = ? WHERE id = ? AND phone_number = ?",
            )
            .bind(now)
            .bind(profile_id)
            .bind(&latest.phone_number)
            .execute(&mut *conn)
            .await?;

            Ok(true)
        }
        .await;

        conn.finish(result).await
    }

    // =========================================================================
    // Password reset tokens
    // =========================================================================

    /// Store a new reset token, invalidating older unused ones for the account
    pub async fn insert_password_reset_token(
        &self,
        token: &PasswordResetToken,
    ) -> Result<(), AppError> {
        let mut conn = self.begin_immediate().await?;

        let result: Result<(), AppError> = async {
            sqlx::query(
                "UPDATE password_reset_tokens SET used_at = ? WHERE account_id = ? AND used_at IS NULL",
            )
            .bind(token.created_at)
            .bind(&token.account_id)
            .execute(&mut *conn)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO password_reset_tokens (
                    id, account_id, token_hash, created_at, expires_at, used_at
                ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&token.id)
            .bind(&token.account_id)
            .bind(&token.token_hash)
            .bind(token.created_at)
            .bind(token.expires_at)
            .bind(token.used_at)
            .execute(&mut *conn)
            .await?;

            Ok(())
        }
        .await;

        conn.finish(result).await
    }

    /// Use a live reset token and replace the account password.
    ///
    /// # Returns
    /// The account ID when the token was valid, `None` otherwise.
    pub async fn consume_password_reset_token(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, AppError> {
        let mut conn = self.begin_immediate().await?;

        let result: Result<Option<String>, AppError> = async {
            let token = sqlx::query_as::<_, PasswordResetToken>(
                r#"
                SELECT * FROM password_reset_tokens
                WHERE token_hash = ? AND used_at IS NULL AND expires_at > ?
                "#,
            )
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&mut *conn)
            .await?;

            let Some(token) = token else {
                return Ok(None);
            };

            sqlx::query("UPDATE password_reset_tokens SET used_at = ? WHERE id = ?")
                .bind(now)
                .bind(&token.id)
                .execute(&mut *conn)
                .await?;

            sqlx::query("UPDATE accounts SET password_hash = ? WHERE id = ?")
                .bind(new_password_hash)
                .bind(&token.account_id)
                .execute(&mut *conn)
                .await?;

            Ok(Some(token.account_id))
        }
        .await;

        conn.finish(result).await
    }
}

/// Direct readers used by tests to check stored state
#[cfg(test)]
impl Database {
    /// Check whether `follower` follows `target`
    pub async fn is_following(
        &self,
        follower_profile_id: &str,
        target_profile_id: &str,
    ) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE follower_profile_id = ? AND target_profile_id = ?)",
        )
        .bind(follower_profile_id)
        .bind(target_profile_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Target profile IDs followed by a profile
    pub async fn get_followed_profile_ids(
        &self,
        follower_profile_id: &str,
    ) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT target_profile_id FROM follows WHERE follower_profile_id = ? ORDER BY created_at ASC",
        )
        .bind(follower_profile_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Count likes on a post
    pub async fn count_likes(&self, post_id: &str) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM likes WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Saved post IDs for an account
    pub async fn get_saved_post_ids(&self, account_id: &str) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT post_id FROM saved_posts WHERE account_id = ? ORDER BY saved_at DESC",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Count comments on a post
    pub async fn count_comments(&self, post_id: &str) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// All notifications addressed to a recipient, newest first
    pub async fn get_notifications_for(
        &self,
        recipient_profile_id: &str,
    ) -> Result<Vec<Notification>, AppError> {
        let notifications = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications WHERE recipient_profile_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(recipient_profile_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }

    /// Get a single notification by ID
    pub async fn get_notification(&self, id: &str) -> Result<Option<Notification>, AppError> {
        let notification =
            sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(notification)
    }
}
