use anyhow::Result;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{transport::Channel, Request, Streaming};

use sns_proto::proto::sns_service_client::SnsServiceClient;
use sns_proto::proto::{Message, Reply};

pub struct Rpc(Mutex<SnsServiceClient<Channel>>);

impl Rpc {
    pub async fn new(uri: &str) -> Result<Self> {
        Ok(Self(Mutex::new(SnsServiceClient::connect(uri.to_string()).await?)))
    }

    /// Registers `username`. Fails if the name is already taken.
    ///
    /// # Proto
    ///
    /// ```proto
    /// rpc Login(Request) returns (Reply);
    /// ```
    pub async fn login(&self, username: &str) -> Result<()> {
        self.0
            .lock()
            .await
            .login(Request::new(sns_proto::proto::Request {
                username: username.to_string(),
                arguments: vec![],
            }))
            .await?;
        Ok(())
    }

    /// Lists every known username, plus `username`'s followers (see
    /// DESIGN.md's Open Questions for why `following_users` carries
    /// followers rather than followees).
    ///
    /// # Proto
    ///
    /// ```proto
    /// rpc List(Request) returns (Reply);
    /// ```
    pub async fn list(&self, username: &str) -> Result<Reply> {
        Ok(self
            .0
            .lock()
            .await
            .list(Request::new(sns_proto::proto::Request {
                username: username.to_string(),
                arguments: vec![],
            }))
            .await?
            .into_inner())
    }

    /// # Proto
    ///
    /// ```proto
    /// rpc Follow(Request) returns (Reply);
    /// ```
    pub async fn follow(&self, username: &str, target: &str) -> Result<()> {
        self.0
            .lock()
            .await
            .follow(Request::new(sns_proto::proto::Request {
                username: username.to_string(),
                arguments: vec![target.to_string()],
            }))
            .await?;
        Ok(())
    }

    /// # Proto
    ///
    /// ```proto
    /// rpc UnFollow(Request) returns (Reply);
    /// ```
    pub async fn unfollow(&self, username: &str, target: &str) -> Result<()> {
        self.0
            .lock()
            .await
            .un_follow(Request::new(sns_proto::proto::Request {
                username: username.to_string(),
                arguments: vec![target.to_string()],
            }))
            .await?;
        Ok(())
    }

    /// Opens the bidirectional timeline stream, sends the handshake
    /// sentinel tagged with `username`, and returns a sender for posting
    /// further messages alongside the server's outbound stream.
    ///
    /// # Proto
    ///
    /// ```proto
    /// rpc Timeline(stream Message) returns (stream Message);
    /// ```
    pub async fn timeline(
        &self,
        username: &str,
    ) -> Result<(mpsc::Sender<Message>, Streaming<Message>)> {
        let (tx, rx) = mpsc::channel(32);
        tx.send(Message {
            username: username.to_string(),
            msg: crate::HANDSHAKE_SENTINEL.to_string(),
            timestamp: None,
        })
        .await
        .ok();

        let response = self
            .0
            .lock()
            .await
            .timeline(Request::new(ReceiverStream::new(rx)))
            .await?;

        Ok((tx, response.into_inner()))
    }
}
