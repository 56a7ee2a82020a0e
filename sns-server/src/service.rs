use std::pin::Pin;

use sns_core::{Post, SnsError, UserRegistry};
use sns_proto::proto::sns_service_server::SnsService;
use sns_proto::proto::{Message, Reply, Request};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request as TonicRequest, Response, Status, Streaming};

/// Handshake sentinel a `Timeline` stream must open with before it is bound
/// to a username and promoted from pending to attached.
pub const HANDSHAKE_SENTINEL: &str = "0xFEE1DEAD";

fn to_status(err: SnsError) -> Status {
    match err {
        SnsError::Duplicate => Status::already_exists("duplicate"),
        SnsError::BadName => Status::not_found("unknown username"),
        SnsError::Io(e) => Status::internal(e.to_string()),
    }
}

fn post_to_message(post: Post) -> Message {
    Message {
        username: post.author,
        msg: post.text,
        timestamp: Some(prost_types::Timestamp {
            seconds: post.timestamp.timestamp(),
            nanos: post.timestamp.timestamp_subsec_nanos() as i32,
        }),
    }
}

/// Implements the RPC surface over an [`sns_core::UserRegistry`].
///
/// # Proto
///
/// ```proto
/// message Request {
///     string username = 1;
///     repeated string arguments = 2;
/// }
///
/// message Reply {
///     string msg = 1;
///     repeated string all_users = 2;
///     repeated string following_users = 3;
/// }
///
/// service SnsService {
///     rpc Login(Request) returns (Reply);
///     rpc List(Request) returns (Reply);
///     rpc Follow(Request) returns (Reply);
///     rpc UnFollow(Request) returns (Reply);
///     rpc Timeline(stream Message) returns (stream Message);
/// }
/// ```
pub struct SnsServiceImpl {
    registry: Arc<UserRegistry>,
}

impl SnsServiceImpl {
    pub fn new(registry: Arc<UserRegistry>) -> Self {
        Self { registry }
    }
}

#[tonic::async_trait]
impl SnsService for SnsServiceImpl {
    /// Creates the account if the username is unused. Once a username has
    /// logged in it can never do so again; there is no logout.
    async fn login(&self, request: TonicRequest<Request>) -> Result<Response<Reply>, Status> {
        let username = request.into_inner().username;
        self.registry.login(&username).await.map_err(to_status)?;
        Ok(Response::new(Reply::default()))
    }

    /// `following_users` carries the caller's *followers*, matching the
    /// reference implementation's surface (see DESIGN.md's Open Questions).
    async fn list(&self, request: TonicRequest<Request>) -> Result<Response<Reply>, Status> {
        let username = request.into_inner().username;
        let (all_users, following_users) = self.registry.list(&username).map_err(to_status)?;
        Ok(Response::new(Reply {
            msg: String::new(),
            all_users,
            following_users,
        }))
    }

    async fn follow(&self, request: TonicRequest<Request>) -> Result<Response<Reply>, Status> {
        let req = request.into_inner();
        let target = req.arguments.first().ok_or_else(|| Status::invalid_argument("missing target"))?;
        self.registry.follow(&req.username, target).await.map_err(to_status)?;
        Ok(Response::new(Reply::default()))
    }

    async fn un_follow(&self, request: TonicRequest<Request>) -> Result<Response<Reply>, Status> {
        let req = request.into_inner();
        let target = req.arguments.first().ok_or_else(|| Status::invalid_argument("missing target"))?;
        self.registry.unfollow(&req.username, target).await.map_err(to_status)?;
        Ok(Response::new(Reply::default()))
    }

    type TimelineStream = Pin<Box<dyn Stream<Item = Result<Message, Status>> + Send + 'static>>;

    /// Binds the stream to a username on the first inbound message, which
    /// must carry the handshake sentinel as its `msg` field; replays the
    /// caller's bounded backlog most-recent-first, then fans out live
    /// posts and forwards every further inbound message as a new post from
    /// that username.
    async fn timeline(
        &self,
        request: TonicRequest<Streaming<Message>>,
    ) -> Result<Response<Self::TimelineStream>, Status> {
        let mut inbound = request.into_inner();
        let registry = self.registry.clone();

        let handshake = inbound
            .next()
            .await
            .ok_or_else(|| Status::invalid_argument("stream closed before handshake"))??;
        if handshake.msg != HANDSHAKE_SENTINEL {
            return Err(Status::invalid_argument("expected handshake sentinel"));
        }
        let username = handshake.username;
        if registry.get(&username).is_none() {
            return Err(Status::not_found("unknown username"));
        }

        let (tx, rx) = mpsc::channel(32);
        // `attach_stream` replays the backlog onto `tx` and marks the user
        // attached atomically under its own lock, so no post fanned out
        // between this call and the subscription is lost or duplicated.
        registry.attach_stream(&username, tx).await.map_err(to_status)?;

        let out_stream = ReceiverStream::new(rx).map(|post| Ok(post_to_message(post)));

        tokio::spawn(async move {
            while let Some(msg) = inbound.next().await {
                let Ok(msg) = msg else { break };
                if msg.username != username {
                    log::warn!(
                        "timeline stream for {username} carried mismatched username {}; closing",
                        msg.username
                    );
                    break;
                }
                if let Err(e) = registry.publish_post(&username, &msg.msg).await {
                    log::warn!("timeline post from {username} rejected: {e}");
                }
            }
            registry.detach_stream(&username).await;
        });

        Ok(Response::new(Box::pin(out_stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sns_core::Persistence;

    async fn service(suffix: &str) -> SnsServiceImpl {
        let dir = std::env::temp_dir().join(format!("sns-server-svc-{suffix}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let registry = UserRegistry::load(Persistence::new(dir)).await.unwrap();
        SnsServiceImpl::new(registry)
    }

    fn req(username: &str, arguments: Vec<String>) -> TonicRequest<Request> {
        TonicRequest::new(Request {
            username: username.to_string(),
            arguments,
        })
    }

    #[tokio::test]
    async fn login_then_duplicate_login_is_rejected() {
        let svc = service("login").await;
        svc.login(req("alice", vec![])).await.unwrap();
        let err = svc.login(req("alice", vec![])).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::AlreadyExists);
    }

    #[tokio::test]
    async fn follow_then_list_reflects_graph() {
        let svc = service("follow-list").await;
        svc.login(req("alice", vec![])).await.unwrap();
        svc.login(req("bob", vec![])).await.unwrap();
        svc.follow(req("alice", vec!["bob".to_string()])).await.unwrap();

        let reply = svc.list(req("alice", vec![])).await.unwrap().into_inner();
        assert_eq!(reply.all_users, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[tokio::test]
    async fn follow_unknown_target_is_not_found() {
        let svc = service("follow-unknown").await;
        svc.login(req("alice", vec![])).await.unwrap();
        let err = svc
            .follow(req("alice", vec!["ghost".to_string()]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::NotFound);
    }
}
