use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use parking_lot::MutexGuard;
use tokio::sync::mpsc;

use crate::persistence::Persistence;
use crate::user::{Post, User, UserState};

#[derive(Debug)]
pub enum SnsError {
    /// Login for a username that already exists, or Follow of an
    /// already-followed target.
    Duplicate,
    /// Follow/UnFollow/List/Timeline referencing an unknown username, or
    /// UnFollow of a target not currently followed.
    BadName,
    Io(std::io::Error),
}

impl std::fmt::Display for SnsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for SnsError {}

impl From<std::io::Error> for SnsError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Process-wide mapping from username to `User`. A single lock guards
/// structural changes (spec.md §3); per-user mutation happens under each
/// `User`'s own locks, acquired in lexicographic username order.
pub struct UserRegistry {
    users: SyncMutex<HashMap<String, Arc<User>>>,
    persistence: Persistence,
}

/// Locks two distinct users' state, always acquiring the lexicographically
/// smaller username's lock first, to satisfy spec.md §4.5's canonical
/// lock-ordering rule. The returned guards are in `(a, b)` order regardless
/// of which was physically locked first. Callers must ensure
/// `a.username != b.username`.
fn lock_pair<'a>(a: &'a User, b: &'a User) -> (MutexGuard<'a, UserState>, MutexGuard<'a, UserState>) {
    if a.username < b.username {
        let ag = a.state().lock();
        let bg = b.state().lock();
        (ag, bg)
    } else {
        let bg = b.state().lock();
        let ag = a.state().lock();
        (ag, bg)
    }
}

impl UserRegistry {
    pub fn new(persistence: Persistence) -> Arc<Self> {
        Arc::new(Self {
            users: SyncMutex::new(HashMap::new()),
            persistence,
        })
    }

    /// Reconstructs the registry from the on-disk index and per-user files.
    pub async fn load(persistence: Persistence) -> anyhow::Result<Arc<Self>> {
        persistence.ensure_dir().await?;
        let registry = Self::new(persistence);

        for username in registry.persistence.load_index().await? {
            let (followers, following, posts) = registry.persistence.read_user(&username).await?;
            let user = Arc::new(User::from_parts(username.clone(), followers, following, posts));
            registry.users.lock().insert(username, user);
        }

        log::info!("loaded {} users from disk", registry.users.lock().len());
        Ok(registry)
    }

    pub fn get(&self, username: &str) -> Option<Arc<User>> {
        self.users.lock().get(username).cloned()
    }

    fn get_pair(&self, a: &str, b: &str) -> Result<(Arc<User>, Arc<User>), SnsError> {
        let users = self.users.lock();
        let ua = users.get(a).cloned().ok_or(SnsError::BadName)?;
        let ub = users.get(b).cloned().ok_or(SnsError::BadName)?;
        Ok((ua, ub))
    }

    async fn persist_user(&self, user: &User) -> Result<(), SnsError> {
        self.persistence
            .write_user(&user.username, &user.followers(), &user.following(), &user.recent_posts())
            .await?;
        Ok(())
    }

    /// Creates the user if absent. Once a username has logged in, it can
    /// never do so again (spec.md §4.5; resolved per DESIGN.md's Login
    /// Open Question — there is no logout).
    pub async fn login(&self, username: &str) -> Result<Arc<User>, SnsError> {
        let user = {
            let mut users = self.users.lock();
            if users.contains_key(username) {
                return Err(SnsError::Duplicate);
            }
            let user = Arc::new(User::new(username));
            users.insert(username.to_string(), user.clone());
            user
        };

        self.persistence.append_index(username).await?;
        self.persist_user(&user).await?;
        Ok(user)
    }

    pub async fn follow(&self, user: &str, target: &str) -> Result<(), SnsError> {
        let (u, t) = self.get_pair(user, target)?;

        if u.username == t.username {
            // Already following self since Login; nothing new to add.
            return Err(SnsError::Duplicate);
        }

        let inserted = {
            let (mut ug, mut tg) = lock_pair(&u, &t);
            let inserted = ug.following.insert(t.username.clone());
            if inserted {
                tg.followers.insert(u.username.clone());
            }
            inserted
        };

        if !inserted {
            return Err(SnsError::Duplicate);
        }

        self.persist_user(&u).await?;
        self.persist_user(&t).await?;
        Ok(())
    }

    pub async fn unfollow(&self, user: &str, target: &str) -> Result<(), SnsError> {
        let (u, t) = self.get_pair(user, target)?;

        if u.username == t.username {
            return Err(SnsError::BadName);
        }

        let was_following = {
            let (mut ug, mut tg) = lock_pair(&u, &t);
            if !ug.following.contains(&t.username) {
                false
            } else {
                ug.following.remove(&t.username);
                tg.followers.remove(&u.username);
                true
            }
        };

        if !was_following {
            return Err(SnsError::BadName);
        }

        self.persist_user(&u).await?;
        self.persist_user(&t).await?;
        Ok(())
    }

    /// Returns (all usernames sorted, `user`'s followers sorted). The
    /// second element populates the `following_users` wire field per the
    /// preserved "bug" documented in spec.md §9.
    pub fn list(&self, user: &str) -> Result<(Vec<String>, Vec<String>), SnsError> {
        let users = self.users.lock();
        let u = users.get(user).ok_or(SnsError::BadName)?;

        let mut all: Vec<String> = users.keys().cloned().collect();
        all.sort();

        let mut following_users = u.followers();
        following_users.sort();

        Ok((all, following_users))
    }

    /// Fans a new post out to every follower of `author` (including the
    /// author, who follows themselves): append to each follower's bounded
    /// history, persist, then deliver on their live stream if attached.
    pub async fn publish_post(&self, author: &str, text: &str) -> Result<Post, SnsError> {
        let followers: Vec<Arc<User>> = {
            let users = self.users.lock();
            let author_user = users.get(author).cloned().ok_or(SnsError::BadName)?;
            let follower_names = author_user.followers();
            follower_names
                .iter()
                .filter_map(|name| users.get(name).cloned())
                .collect()
        };

        let post = Post {
            author: author.to_string(),
            text: text.to_string(),
            timestamp: chrono::Utc::now(),
        };

        for follower in &followers {
            follower.publish(post.clone()).await;
            self.persist_user(follower).await?;
        }

        Ok(post)
    }

    pub async fn attach_stream(&self, username: &str, tx: mpsc::Sender<Post>) -> Result<(), SnsError> {
        let user = self.get(username).ok_or(SnsError::BadName)?;
        user.attach_stream(tx).await;
        Ok(())
    }

    pub async fn detach_stream(&self, username: &str) {
        if let Some(user) = self.get(username) {
            user.detach_stream().await;
        }
    }
}
