// MPD player
// Speaks the MPD text protocol: https://mpd.readthedocs.io/en/latest/protocol.html

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

use super::{Player, Subscription};
use crate::config::MpdConfig;
use crate::error::PlayerError;
use crate::text_cleanup::TextCleaner;
use crate::track::{PlaybackState, Status, Track};

const CHANNEL_CAPACITY: usize = 16;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// `key: value` pairs of a successful reply
type Reply = Vec<(String, String)>;

/// One protocol session with an MPD server
struct Connection<S> {
    stream: BufReader<S>,
}

impl Connection<TcpStream> {
    async fn open(address: &str, password: Option<&str>) -> Result<Self, PlayerError> {
        let stream = connect_within(address, CONNECT_TIMEOUT, TcpStream::connect(address)).await?;

        let mut connection = Self::handshake(stream).await?;
        if let Some(password) = password {
            connection
                .command(&format!("password {}", quote(password)))
                .await?;
        }

        Ok(connection)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    async fn handshake(stream: S) -> Result<Self, PlayerError> {
        let mut connection = Self {
            stream: BufReader::new(stream),
        };

        let greeting = connection.read_line().await?;
        if !greeting.starts_with("OK MPD ") {
            return Err(PlayerError::Protocol(format!(
                "unexpected greeting {:?}",
                greeting
            )));
        }
        log::debug!("Connected: {}", greeting);

        Ok(connection)
    }

    async fn read_line(&mut self) -> Result<String, PlayerError> {
        let mut line = String::new();
        let read = self
            .stream
            .read_line(&mut line)
            .await
            .map_err(PlayerError::Disconnected)?;

        if read == 0 {
            return Err(PlayerError::Disconnected(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            )));
        }

        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Send a command and collect its reply
    async fn command(&mut self, command: &str) -> Result<Reply, PlayerError> {
        let name = command.split_whitespace().next().unwrap_or_default();

        self.stream
            .write_all(format!("{}\n", command).as_bytes())
            .await
            .map_err(PlayerError::Disconnected)?;
        self.stream
            .flush()
            .await
            .map_err(PlayerError::Disconnected)?;

        let mut reply = Reply::new();
        let mut malformed = None;
        loop {
            let line = self.read_line().await?;

            if line == "OK" {
                return match malformed {
                    Some(line) => Err(PlayerError::Protocol(format!(
                        "unexpected line {:?} in reply to `{}`",
                        line, name
                    ))),
                    None => Ok(reply),
                };
            }

            if let Some(ack) = line.strip_prefix("ACK ") {
                // ACK [error@command_listNum] {current_command} message_text
                let message = ack.split_once("} ").map_or(ack, |(_, message)| message);
                return Err(PlayerError::Ack {
                    command: name.to_string(),
                    message: message.to_string(),
                });
            }

            match line.split_once(": ") {
                Some((key, value)) => reply.push((key.to_string(), value.to_string())),
                None => {
                    // keep reading so the session stays in sync
                    malformed.get_or_insert(line);
                }
            }
        }
    }

    async fn status(&mut self) -> Result<Status, PlayerError> {
        let status = self.command("status").await?;
        let song = self.command("currentsong").await?;
        parse_status(&status, &song)
    }
}

/// Give up on `connect` once `limit` has passed
async fn connect_within<S>(
    address: &str,
    limit: Duration,
    connect: impl Future<Output = io::Result<S>>,
) -> Result<S, PlayerError> {
    let result = match tokio::time::timeout(limit, connect).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no answer after {}s", limit.as_secs()),
        )),
    };

    result.map_err(|source| PlayerError::Connect {
        address: address.to_string(),
        source,
    })
}

fn quote(argument: &str) -> String {
    format!(
        "\"{}\"",
        argument.replace('\\', "\\\\").replace('"', "\\\"")
    )
}

fn field<'a>(reply: &'a [(String, String)], key: &str) -> Option<&'a str> {
    reply
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, value)| value.as_str())
}

fn parse_seconds(value: &str) -> Option<Duration> {
    value
        .parse::<f64>()
        .ok()
        .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
}

/// Build a [`Status`] from the replies to `status` and `currentsong`
fn parse_status(status: &[(String, String)], song: &[(String, String)]) -> Result<Status, PlayerError> {
    let state = match field(status, "state") {
        Some("play") => PlaybackState::Playing,
        Some("pause") => PlaybackState::Paused,
        Some("stop") => PlaybackState::Stopped,
        other => {
            return Err(PlayerError::Protocol(format!(
                "unknown player state {:?}",
                other
            )))
        }
    };

    // Older servers only report `time: <elapsed>:<total>`
    let duration = field(status, "duration")
        .or_else(|| field(status, "time").and_then(|time| time.split_once(':').map(|(_, total)| total)))
        .and_then(parse_seconds)
        // Streams report a zero length
        .filter(|duration| !duration.is_zero());

    let elapsed = field(status, "elapsed")
        .and_then(parse_seconds)
        .unwrap_or_default();

    let track = Track::new(
        field(song, "Title").unwrap_or_default(),
        field(song, "Artist").unwrap_or_default(),
        field(song, "Album").unwrap_or_default(),
    );

    Ok(Status {
        track,
        duration,
        elapsed,
        state,
    })
}

/// Background task behind one subscription
struct Watcher<S> {
    name: String,
    connection: Connection<S>,
    cleaner: Arc<TextCleaner>,
    statuses: mpsc::Sender<Status>,
    errors: mpsc::Sender<PlayerError>,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Watcher<S> {
    async fn run(mut self) {
        let mut initial = true;
        loop {
            if !initial {
                let idle = tokio::select! {
                    result = self.connection.command("idle player") => result,
                    () = self.statuses.closed() => break,
                };
                if let Err(e) = idle {
                    if self.report(e).await {
                        continue;
                    }
                    break;
                }
            }
            initial = false;

            let mut status = match self.connection.status().await {
                Ok(status) => status,
                Err(e) => {
                    if self.report(e).await {
                        continue;
                    }
                    break;
                }
            };

            // Pausing and resuming only repeat the current track
            if status.state == PlaybackState::Paused {
                log::debug!("{}: paused", self.name);
                continue;
            }

            status.track = self.cleaner.clean_track(status.track);
            if self.statuses.send(status).await.is_err() {
                break;
            }
        }
        log::debug!("{}: watcher stopped", self.name);
    }

    /// Forward an error, returning whether watching can go on
    async fn report(&self, error: PlayerError) -> bool {
        let terminal = error.is_terminal();
        log::debug!("{}: {}", self.name, error);
        let _ = self.errors.send(error).await;
        !terminal
    }
}

/// A Music Player Daemon instance
pub struct Mpd {
    name: String,
    address: String,
    password: Option<String>,
    cleaner: Arc<TextCleaner>,
    query: Mutex<Option<Connection<TcpStream>>>,
}

impl Mpd {
    pub fn new(config: &MpdConfig, cleaner: Arc<TextCleaner>) -> Self {
        Self {
            name: config.name.clone(),
            address: config.address.clone(),
            password: config.password.clone().filter(|password| !password.is_empty()),
            cleaner,
            query: Mutex::new(None),
        }
    }

    async fn query_status(&self) -> Result<Status, PlayerError> {
        let mut query = self.query.lock().await;

        if let Some(connection) = query.as_mut() {
            match connection.status().await {
                Ok(status) => return Ok(status),
                Err(PlayerError::Disconnected(e)) => {
                    log::debug!("{}: query connection went stale ({}), reconnecting", self.name, e);
                    *query = None;
                }
                Err(e) => return Err(e),
            }
        }

        let mut connection = Connection::open(&self.address, self.password.as_deref()).await?;
        let status = connection.status().await?;
        *query = Some(connection);
        Ok(status)
    }
}

impl Player for Mpd {
    fn name(&self) -> &str {
        &self.name
    }

    async fn subscribe(&self) -> Result<Subscription, PlayerError> {
        let connection = Connection::open(&self.address, self.password.as_deref()).await?;
        let (status_tx, statuses) = mpsc::channel(CHANNEL_CAPACITY);
        let (error_tx, errors) = mpsc::channel(CHANNEL_CAPACITY);

        let watcher = Watcher {
            name: self.name.clone(),
            connection,
            cleaner: Arc::clone(&self.cleaner),
            statuses: status_tx,
            errors: error_tx,
        };
        tokio::spawn(watcher.run());

        log::info!("{}: watching {}", self.name, self.address);
        Ok(Subscription { statuses, errors })
    }

    /// Paused still counts as playing, the track is loaded and will resume
    async fn now_playing(&self) -> Result<Option<Track>, PlayerError> {
        let status = self.query_status().await?;
        Ok(match status.state {
            PlaybackState::Playing | PlaybackState::Paused => {
                Some(self.cleaner.clean_track(status.track))
            }
            PlaybackState::Stopped => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CleanupConfig;
    use tokio::io::DuplexStream;

    const SONG: &str = "file: massive_attack/teardrop.flac\nTitle: Teardrop\nArtist: Massive Attack\nAlbum: Mezzanine [Explicit]\nOK\n";

    /// Plays the server side of a scripted session, then hangs up
    async fn serve(stream: DuplexStream, script: Vec<(&'static str, &'static str)>) {
        let mut stream = BufReader::new(stream);
        stream.write_all(b"OK MPD 0.23.5\n").await.unwrap();

        for (expected, reply) in script {
            let mut line = String::new();
            stream.read_line(&mut line).await.unwrap();
            assert_eq!(line.trim_end(), expected);
            stream.write_all(reply.as_bytes()).await.unwrap();
        }
    }

    async fn watch(
        client: DuplexStream,
    ) -> (
        mpsc::Receiver<Status>,
        mpsc::Receiver<PlayerError>,
        tokio::task::JoinHandle<()>,
    ) {
        let connection = Connection::handshake(client).await.unwrap();
        let (status_tx, statuses) = mpsc::channel(CHANNEL_CAPACITY);
        let (error_tx, errors) = mpsc::channel(CHANNEL_CAPACITY);
        let watcher = Watcher {
            name: "test".to_string(),
            connection,
            cleaner: Arc::new(TextCleaner::new(&CleanupConfig::default())),
            statuses: status_tx,
            errors: error_tx,
        };
        (statuses, errors, tokio::spawn(watcher.run()))
    }

    fn pairs(raw: &str) -> Vec<(String, String)> {
        raw.lines()
            .filter_map(|line| line.split_once(": "))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn command_collects_pairs() {
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(serve(server, vec![("currentsong", SONG)]));

        let mut connection = Connection::handshake(client).await.unwrap();
        let reply = connection.command("currentsong").await.unwrap();

        assert_eq!(field(&reply, "Title"), Some("Teardrop"));
        assert_eq!(field(&reply, "Artist"), Some("Massive Attack"));
        assert_eq!(reply.len(), 4);
    }

    #[tokio::test]
    async fn ack_becomes_error() {
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(serve(
            server,
            vec![("play 99", "ACK [2@0] {play} Bad song index\n")],
        ));

        let mut connection = Connection::handshake(client).await.unwrap();
        let err = connection.command("play 99").await.unwrap_err();

        match err {
            PlayerError::Ack { command, message } => {
                assert_eq!(command, "play");
                assert_eq!(message, "Bad song index");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn rejects_foreign_greeting() {
        let (client, mut server) = tokio::io::duplex(4096);
        server.write_all(b"SSH-2.0-OpenSSH_9.6\n").await.unwrap();

        let err = Connection::handshake(client).await.err().unwrap();
        assert!(matches!(err, PlayerError::Protocol(_)));
    }

    #[test]
    fn parses_playing_status() {
        let status = parse_status(
            &pairs("volume: 80\nstate: play\nelapsed: 12.5\nduration: 330.427\n"),
            &pairs(SONG),
        )
        .unwrap();

        assert_eq!(status.state, PlaybackState::Playing);
        assert_eq!(status.duration, Some(Duration::from_secs_f64(330.427)));
        assert_eq!(status.elapsed, Duration::from_secs_f64(12.5));
        assert_eq!(status.track.album, "Mezzanine [Explicit]");
    }

    #[test]
    fn falls_back_to_time_field() {
        let status = parse_status(&pairs("state: pause\ntime: 12:331\n"), &pairs(SONG)).unwrap();

        assert_eq!(status.state, PlaybackState::Paused);
        assert_eq!(status.duration, Some(Duration::from_secs(331)));
    }

    #[test]
    fn unusable_duration_is_unknown() {
        let garbled = parse_status(&pairs("state: play\nduration: soon\n"), &pairs(SONG)).unwrap();
        let stream = parse_status(&pairs("state: play\ntime: 50:0\n"), &pairs(SONG)).unwrap();
        let missing = parse_status(&pairs("state: play\n"), &pairs("OK\n")).unwrap();
        let huge = parse_status(&pairs("state: play\nduration: 1e30\n"), &pairs(SONG)).unwrap();
        let negative = parse_status(&pairs("state: play\nduration: -3\n"), &pairs(SONG)).unwrap();
        let nan = parse_status(&pairs("state: play\nduration: NaN\nelapsed: inf\n"), &pairs(SONG)).unwrap();

        assert_eq!(garbled.duration, None);
        assert_eq!(stream.duration, None);
        assert_eq!(huge.duration, None);
        assert_eq!(negative.duration, None);
        assert_eq!(nan.duration, None);
        assert_eq!(nan.elapsed, Duration::ZERO);
        assert_eq!(missing.duration, None);
        assert_eq!(missing.track, Track::default());
    }

    #[test]
    fn unknown_state_is_protocol_error() {
        let err = parse_status(&pairs("state: spinning\n"), &[]).unwrap_err();
        assert!(matches!(err, PlayerError::Protocol(_)));
    }

    #[test]
    fn quotes_arguments() {
        assert_eq!(quote(r#"pa"ss\word"#), r#""pa\"ss\\word""#);
    }

    #[tokio::test]
    async fn watcher_reports_transitions_until_disconnect() {
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(serve(
            server,
            vec![
                ("status", "state: play\nduration: 200.0\nelapsed: 3.0\nOK\n"),
                ("currentsong", SONG),
                ("idle player", "changed: player\nOK\n"),
                ("status", "state: pause\nduration: 200.0\nelapsed: 9.0\nOK\n"),
                ("currentsong", SONG),
                ("idle player", "changed: player\nOK\n"),
                ("status", "state: stop\nOK\n"),
                ("currentsong", "OK\n"),
            ],
        ));

        let (mut statuses, mut errors, _) = watch(client).await;

        let playing = statuses.recv().await.unwrap();
        assert!(playing.is_playing());
        assert_eq!(playing.track, Track::new("Teardrop", "Massive Attack", "Mezzanine"));
        assert_eq!(playing.duration, Some(Duration::from_secs(200)));

        // the pause is swallowed, the stop comes through
        let stopped = statuses.recv().await.unwrap();
        assert_eq!(stopped.state, PlaybackState::Stopped);

        assert!(statuses.recv().await.is_none());
        let err = errors.recv().await.unwrap();
        assert!(err.is_terminal());
        assert!(errors.recv().await.is_none());
    }

    #[tokio::test]
    async fn watcher_survives_out_of_range_duration() {
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(serve(
            server,
            vec![
                ("status", "state: play\nduration: 1e30\nelapsed: 3.0\nOK\n"),
                ("currentsong", SONG),
            ],
        ));

        let (mut statuses, mut errors, task) = watch(client).await;

        let playing = statuses.recv().await.unwrap();
        assert!(playing.is_playing());
        assert_eq!(playing.duration, None);

        // the server hangs up after the script, which ends the watcher normally
        assert!(statuses.recv().await.is_none());
        assert!(errors.recv().await.unwrap().is_terminal());
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn connect_gives_up_after_limit() {
        let err = connect_within::<TcpStream>(
            "192.0.2.1:6600",
            Duration::from_secs(10),
            std::future::pending(),
        )
        .await
        .unwrap_err();

        match err {
            PlayerError::Connect { address, source } => {
                assert_eq!(address, "192.0.2.1:6600");
                assert_eq!(source.kind(), io::ErrorKind::TimedOut);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn connect_failure_keeps_its_cause() {
        let refused = async { Err::<DuplexStream, _>(io::Error::from(io::ErrorKind::ConnectionRefused)) };
        let err = connect_within("localhost:6600", Duration::from_secs(10), refused)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PlayerError::Connect { source, .. } if source.kind() == io::ErrorKind::ConnectionRefused
        ));
    }
}
