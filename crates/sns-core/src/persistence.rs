use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::user::Post;

const SEC_USER: &str = "\u{E000}USER\u{E000}";
const SEC_FOLLOWERS: &str = "\u{E000}FOLLOWERS\u{E000}";
const SEC_FOLLOWING: &str = "\u{E000}FOLLOWING\u{E000}";
const SEC_POSTS: &str = "\u{E000}POSTS\u{E000}";

const INDEX_FILE: &str = "server.dat";

/// Per-user `.usr` files rewritten in full on every change, plus an
/// append-only global index (spec.md §4.7). Section markers use
/// Private-Use-Area code points so they stay valid UTF-8 while remaining
/// unrepresentable in ordinary usernames or post text.
#[derive(Clone)]
pub struct Persistence {
    base_dir: PathBuf,
}

impl Persistence {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn user_file(&self, username: &str) -> PathBuf {
        self.base_dir.join(format!("{username}.usr"))
    }

    fn index_file(&self) -> PathBuf {
        self.base_dir.join(INDEX_FILE)
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.base_dir).await
    }

    /// Appends a newly-created username to the global index.
    pub async fn append_index(&self, username: &str) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.index_file())
            .await?;
        file.write_all(username.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }

    /// Returns the usernames recorded in the index, or an empty list if it
    /// doesn't exist yet.
    pub async fn load_index(&self) -> std::io::Result<Vec<String>> {
        match fs::read_to_string(self.index_file()).await {
            Ok(text) => Ok(text.lines().map(str::to_string).filter(|l| !l.is_empty()).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Rewrites `⟨username⟩.usr` in full.
    pub async fn write_user(
        &self,
        username: &str,
        followers: &[String],
        following: &[String],
        posts: &[Post],
    ) -> std::io::Result<()> {
        let mut out = String::new();
        out.push_str(SEC_USER);
        out.push('\n');
        out.push_str(username);
        out.push('\n');

        out.push_str(SEC_FOLLOWERS);
        out.push('\n');
        for f in followers {
            out.push_str(f);
            out.push('\n');
        }

        out.push_str(SEC_FOLLOWING);
        out.push('\n');
        for f in following {
            out.push_str(f);
            out.push('\n');
        }

        out.push_str(SEC_POSTS);
        out.push('\n');
        for post in posts {
            out.push_str(&post.author);
            out.push('\n');
            out.push_str(&post.text);
            out.push('\n');
            out.push_str(&post.timestamp.to_rfc3339());
            out.push('\n');
        }

        fs::write(self.user_file(username), out).await
    }

    /// Reads back `⟨username⟩.usr`, returning (followers, following, posts).
    pub async fn read_user(
        &self,
        username: &str,
    ) -> std::io::Result<(Vec<String>, Vec<String>, Vec<Post>)> {
        let text = fs::read_to_string(self.user_file(username)).await?;
        Ok(parse_user_file(&text))
    }
}

#[derive(PartialEq, Eq)]
enum Section {
    None,
    User,
    Followers,
    Following,
    Posts,
}

fn parse_user_file(text: &str) -> (Vec<String>, Vec<String>, Vec<Post>) {
    let mut section = Section::None;
    let mut followers = Vec::new();
    let mut following = Vec::new();
    let mut posts = Vec::new();
    let mut triple: Vec<&str> = Vec::with_capacity(3);

    for line in text.lines() {
        match line {
            SEC_USER => {
                section = Section::User;
                continue;
            }
            SEC_FOLLOWERS => {
                section = Section::Followers;
                continue;
            }
            SEC_FOLLOWING => {
                section = Section::Following;
                continue;
            }
            SEC_POSTS => {
                section = Section::Posts;
                continue;
            }
            _ => {}
        }

        match section {
            Section::User | Section::None => {}
            Section::Followers => followers.push(line.to_string()),
            Section::Following => following.push(line.to_string()),
            Section::Posts => {
                triple.push(line);
                if triple.len() == 3 {
                    if let Ok(timestamp) = DateTime::parse_from_rfc3339(triple[2]) {
                        posts.push(Post {
                            author: triple[0].to_string(),
                            text: triple[1].to_string(),
                            timestamp: timestamp.with_timezone(&Utc),
                        });
                    }
                    triple.clear();
                }
            }
        }
    }

    (followers, following, posts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_user_roundtrips() {
        let dir = std::env::temp_dir().join(format!("sns-core-test-{}", std::process::id()));
        let persistence = Persistence::new(&dir);
        persistence.ensure_dir().await.unwrap();

        let followers = vec!["alice".to_string(), "bob".to_string()];
        let following = vec!["alice".to_string()];
        let posts = vec![Post {
            author: "alice".to_string(),
            text: "hello".to_string(),
            timestamp: Utc::now(),
        }];

        persistence
            .write_user("alice", &followers, &following, &posts)
            .await
            .unwrap();

        let (read_followers, read_following, read_posts) =
            persistence.read_user("alice").await.unwrap();

        assert_eq!(read_followers, followers);
        assert_eq!(read_following, following);
        assert_eq!(read_posts.len(), 1);
        assert_eq!(read_posts[0].text, "hello");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn index_append_and_load() {
        let dir = std::env::temp_dir().join(format!("sns-core-test-idx-{}", std::process::id()));
        let persistence = Persistence::new(&dir);
        persistence.ensure_dir().await.unwrap();

        persistence.append_index("alice").await.unwrap();
        persistence.append_index("bob").await.unwrap();

        let names = persistence.load_index().await.unwrap();
        assert_eq!(names, vec!["alice".to_string(), "bob".to_string()]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
