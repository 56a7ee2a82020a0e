use crate::cli::{print_line, LineReader};
use crate::rpc::Rpc;

/// A user-typed command, parsed case-insensitively with a single space
/// separating the command word from its argument, mirroring the
/// reference client's `rfind(..., 0) == 0` prefix dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ParsedCommand {
    Follow(String),
    Unfollow(String),
    List,
    Timeline,
    Unknown,
}

fn parse_input(line: &str) -> ParsedCommand {
    let line = line.trim();
    let mut parts = line.splitn(2, ' ');
    let word = parts.next().unwrap_or("").to_uppercase();
    let arg = parts.next().unwrap_or("").trim().to_string();

    match word.as_str() {
        "FOLLOW" => ParsedCommand::Follow(arg),
        "UNFOLLOW" => ParsedCommand::Unfollow(arg),
        "LIST" => ParsedCommand::List,
        "TIMELINE" => ParsedCommand::Timeline,
        _ => ParsedCommand::Unknown,
    }
}

/// Runs the interactive client: logs `username` in, then loops reading
/// FOLLOW/UNFOLLOW/LIST/TIMELINE commands until stdin closes. Entering
/// timeline mode is one-way, matching the reference implementation's
/// "no way back to command mode" contract.
pub async fn run(host: &str, port: u16, username: &str) -> anyhow::Result<()> {
    let rpc = Rpc::new(&format!("http://{host}:{port}")).await?;
    rpc.login(username).await?;

    let mut reader = LineReader::new();

    loop {
        let Some(line) = reader.next_line().await? else {
            return Ok(());
        };

        match parse_input(&line) {
            ParsedCommand::Unknown => {
                print_line("unrecognised command");
            }
            ParsedCommand::Follow(target) => match rpc.follow(username, &target).await {
                Ok(()) => print_line("ok"),
                Err(e) => print_line(&format!("failed: {e}")),
            },
            ParsedCommand::Unfollow(target) => match rpc.unfollow(username, &target).await {
                Ok(()) => print_line("ok"),
                Err(e) => print_line(&format!("failed: {e}")),
            },
            ParsedCommand::List => match rpc.list(username).await {
                Ok(reply) => {
                    print_line(&format!("all: {}", reply.all_users.join(",")));
                    print_line(&format!("following: {}", reply.following_users.join(",")));
                }
                Err(e) => print_line(&format!("failed: {e}")),
            },
            ParsedCommand::Timeline => {
                timeline_mode(&rpc, username, &mut reader).await?;
                return Ok(());
            }
        }
    }
}

/// Timeline mode: concurrently read lines from the user (posted as new
/// timeline entries) and messages from the server's outbound stream
/// (printed to the terminal). There is no way back to command mode.
async fn timeline_mode(rpc: &Rpc, username: &str, reader: &mut LineReader) -> anyhow::Result<()> {
    use tokio_stream::StreamExt;

    let (tx, mut inbound) = rpc.timeline(username).await?;

    loop {
        tokio::select! {
            line = reader.next_line() => {
                match line? {
                    Some(line) => {
                        let _ = tx.send(sns_proto::proto::Message {
                            username: username.to_string(),
                            msg: line,
                            timestamp: None,
                        }).await;
                    }
                    None => return Ok(()),
                }
            }
            msg = inbound.next() => {
                match msg {
                    Some(Ok(msg)) => print_line(&format!("{}: {}", msg.username, msg.msg)),
                    Some(Err(e)) => {
                        print_line(&format!("stream error: {e}"));
                        return Ok(());
                    }
                    None => return Ok(()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(parse_input("follow bob"), ParsedCommand::Follow("bob".to_string()));
        assert_eq!(parse_input("UNFOLLOW bob"), ParsedCommand::Unfollow("bob".to_string()));
        assert_eq!(parse_input("List"), ParsedCommand::List);
        assert_eq!(parse_input("timeline"), ParsedCommand::Timeline);
        assert_eq!(parse_input("nonsense"), ParsedCommand::Unknown);
    }
}
