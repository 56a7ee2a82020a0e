use crs_wire::{PendingRequest, Response, ResponseTail, Status};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::cli::{LineReader, print_line};

/// A user-typed command, parsed case-insensitively with a single space
/// separating the command word from its argument (spec.md §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
enum ParsedCommand {
    Create(String),
    Delete(String),
    Join(String),
    List,
    Unknown,
}

fn parse_input(line: &str) -> ParsedCommand {
    let line = line.trim();
    let mut parts = line.splitn(2, ' ');
    let word = parts.next().unwrap_or("").to_uppercase();
    let arg = parts.next().unwrap_or("").trim().to_string();

    match word.as_str() {
        "CREATE" => ParsedCommand::Create(arg),
        "DELETE" => ParsedCommand::Delete(arg),
        "JOIN" => ParsedCommand::Join(arg),
        "LIST" => ParsedCommand::List,
        _ => ParsedCommand::Unknown,
    }
}

async fn send_and_read(
    control: &mut TcpStream,
    frame: Vec<u8>,
    pending: PendingRequest,
) -> anyhow::Result<Response> {
    control.write_all(&frame).await?;
    let mut buf = vec![0u8; 4096];
    let n = control.read(&mut buf).await?;
    Ok(crs_wire::decode_response(&buf[..n], pending)?)
}

fn describe(status: Status) -> &'static str {
    match status {
        Status::Success => "ok",
        Status::FailureAlreadyExists => "already exists",
        Status::FailureNotExists => "does not exist",
        Status::FailureInvalid => "invalid command",
        Status::FailureInvalidUsername => "invalid username",
        Status::FailureUnknown => "unknown failure",
    }
}

/// Runs the interactive client: command mode until a successful JOIN
/// switches to chat mode on the room's port, then back to a fresh command
/// connection once the room tears down or the user leaves.
pub async fn run(host: &str, control_port: u16) -> anyhow::Result<()> {
    let mut reader = LineReader::new();

    loop {
        let mut control = TcpStream::connect((host, control_port)).await?;

        loop {
            let Some(line) = reader.next_line().await? else {
                return Ok(());
            };

            match parse_input(&line) {
                ParsedCommand::Unknown => {
                    print_line("unrecognised command");
                    continue;
                }
                ParsedCommand::Create(name) => {
                    let resp = send_and_read(
                        &mut control,
                        crs_wire::encode_create(&name),
                        PendingRequest::Create,
                    )
                    .await?;
                    print_line(describe(resp.status));
                }
                ParsedCommand::Delete(name) => {
                    let resp = send_and_read(
                        &mut control,
                        crs_wire::encode_delete(&name),
                        PendingRequest::Delete,
                    )
                    .await?;
                    print_line(describe(resp.status));
                }
                ParsedCommand::List => {
                    let resp = send_and_read(
                        &mut control,
                        crs_wire::encode_list(),
                        PendingRequest::List,
                    )
                    .await?;
                    if let ResponseTail::List(names) = resp.tail {
                        if names.is_empty() {
                            print_line("empty");
                        } else {
                            print_line(&names.join(","));
                        }
                    }
                }
                ParsedCommand::Join(name) => {
                    let resp = send_and_read(
                        &mut control,
                        crs_wire::encode_join(&name),
                        PendingRequest::Join,
                    )
                    .await?;

                    // The control server's handler terminates after JOIN
                    // either way; this connection is spent regardless.
                    if resp.status == Status::Success {
                        if let ResponseTail::Join { port, .. } = resp.tail {
                            drop(control);
                            chat_mode(host, port, &mut reader).await?;
                        }
                    } else {
                        print_line(describe(resp.status));
                    }

                    break;
                }
            }
        }
    }
}

/// Chat mode: concurrently read lines from the user (sent verbatim to the
/// room) and bytes from the room socket (printed to the terminal). A
/// payload whose first four bytes are the DELETE tag signals teardown; the
/// client closes the socket and returns to command mode.
async fn chat_mode(host: &str, port: u16, reader: &mut LineReader) -> anyhow::Result<()> {
    let socket = TcpStream::connect((host, port)).await?;
    let (mut room_reader, mut room_writer) = socket.into_split();
    let mut buf = vec![0u8; 4096];

    loop {
        tokio::select! {
            line = reader.next_line() => {
                match line? {
                    Some(line) => {
                        let mut payload = line.into_bytes();
                        payload.push(0);
                        room_writer.write_all(&payload).await?;
                    }
                    None => return Ok(()),
                }
            }
            n = room_reader.read(&mut buf) => {
                let n = n?;
                if n == 0 {
                    return Ok(());
                }

                if crs_wire::is_delete_tag(&buf[..n]) {
                    print_line("room deleted by server");
                    return Ok(());
                }

                print_line(&String::from_utf8_lossy(&buf[..n]));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(parse_input("create room1"), ParsedCommand::Create("room1".to_string()));
        assert_eq!(parse_input("JOIN room1"), ParsedCommand::Join("room1".to_string()));
        assert_eq!(parse_input("List"), ParsedCommand::List);
        assert_eq!(parse_input("nonsense"), ParsedCommand::Unknown);
    }
}
