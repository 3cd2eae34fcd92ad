//! Coach server: receives landmark frames over TCP, counts reps and returns
//! form feedback per session.

use std::collections::HashSet;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use futures::StreamExt as _;

use rep_coach::config::Config;
use rep_coach::protocol::{self, ClientMessage, ServerMessage, SessionSummary};
use rep_coach::session::SessionRegistry;

const CONFIG_PATH: &str = "coach.toml";

// ===========================================================================
// Logging
// ===========================================================================

type LogFile = Arc<Mutex<std::io::BufWriter<std::fs::File>>>;

fn open_log_file() -> Result<LogFile> {
    std::fs::create_dir_all("logs")?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = format!("logs/coach_{}.log", ts);
    let file = std::fs::File::create(&path)?;
    eprintln!("Log: {}", path);
    Ok(Arc::new(Mutex::new(std::io::BufWriter::new(file))))
}

macro_rules! log {
    ($logfile:expr, $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        eprintln!("{}", msg);
        if let Ok(mut f) = $logfile.lock() {
            let _ = writeln!(f, "{}", msg);
            let _ = f.flush();
        }
    }};
}

type SharedRegistry = Arc<Mutex<SessionRegistry>>;

// ===========================================================================
// Connection loop
// ===========================================================================

fn session_of(msg: &ClientMessage) -> Option<&str> {
    match msg {
        ClientMessage::AnalyzeFrame { session_id, .. } => Some(session_id.as_str()),
        ClientMessage::ResetCounter { session_id } | ClientMessage::EndSession { session_id } => {
            Some(session_id.as_str())
        }
        ClientMessage::Health => None,
    }
}

fn log_summary(logfile: &LogFile, addr: SocketAddr, session_id: &str, summary: &SessionSummary) {
    let avg = summary
        .avg_score
        .map(|s| format!("{:.1}", s))
        .unwrap_or_else(|| "-".to_string());
    log!(
        logfile,
        "[{}] session '{}' ended: {} reps={} avg_score={} issues={}",
        addr,
        session_id,
        summary.exercise,
        summary.reps,
        avg,
        summary.issues.len()
    );
}

async fn receive_loop(
    tcp: tokio::net::TcpStream,
    addr: SocketAddr,
    registry: &SharedRegistry,
    logfile: &LogFile,
    verbose: bool,
) -> Result<()> {
    let framed = protocol::message_stream(tcp);
    let (mut sink, mut reader) = framed.split();
    // ログ用: この接続で開始したセッション
    let mut started: HashSet<String> = HashSet::new();

    loop {
        let bytes = match reader.next().await {
            Some(Ok(b)) => b,
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(()),
        };
        let msg: ClientMessage = match bincode::deserialize(&bytes) {
            Ok(m) => m,
            Err(e) => {
                log!(logfile, "[{}] bad message: {}", addr, e);
                let reply = ServerMessage::Error { message: format!("bad message: {}", e) };
                protocol::send_to_sink(&mut sink, &reply).await?;
                continue;
            }
        };

        let session_id = session_of(&msg).map(str::to_string);
        let is_frame = matches!(msg, ClientMessage::AnalyzeFrame { .. });

        let reply = {
            let mut registry = registry
                .lock()
                .map_err(|_| anyhow::anyhow!("session registry poisoned"))?;
            registry.handle(addr, msg)
        };

        match &reply {
            ServerMessage::Report { session_id, report } => {
                if started.insert(session_id.clone()) {
                    log!(logfile, "[{}] session '{}' started ({})", addr, session_id, report.exercise);
                }
                if verbose {
                    log!(
                        logfile,
                        "[{}] {} reps={} stage={} angle={:.1} score={} | {}",
                        session_id,
                        report.exercise,
                        report.count,
                        report.stage.map(|s| s.as_str()).unwrap_or("-"),
                        report.primary_angle,
                        report.score.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
                        report.feedback
                    );
                }
            }
            ServerMessage::CounterReset { session_id, .. } => {
                log!(logfile, "[{}] session '{}' counter reset", addr, session_id);
            }
            ServerMessage::SessionEnded { session_id, summary } => {
                started.remove(session_id);
                log_summary(logfile, addr, session_id, summary);
            }
            ServerMessage::Error { message } => {
                if is_frame || verbose {
                    let id = session_id.as_deref().unwrap_or("-");
                    log!(logfile, "[{}] session '{}' error: {}", addr, id, message);
                }
            }
            ServerMessage::Healthy { .. } => {}
        }

        protocol::send_to_sink(&mut sink, &reply).await?;
    }
}

async fn handle_connection(
    tcp: tokio::net::TcpStream,
    addr: SocketAddr,
    registry: SharedRegistry,
    logfile: LogFile,
    verbose: bool,
) -> Result<()> {
    let result = receive_loop(tcp, addr, &registry, &logfile, verbose).await;

    // この接続が所有するセッションだけを破棄する
    let ended = match registry.lock() {
        Ok(mut registry) => registry.end_client(addr),
        Err(_) => Vec::new(),
    };
    for (session_id, summary) in &ended {
        log_summary(&logfile, addr, session_id, summary);
    }
    if !ended.is_empty() {
        log!(logfile, "[{}] closed {} session(s)", addr, ended.len());
    }

    result
}

async fn accept_loop(
    listener: tokio::net::TcpListener,
    registry: SharedRegistry,
    logfile: LogFile,
    verbose: bool,
) -> Result<()> {
    loop {
        let (tcp_stream, addr) = listener.accept().await?;
        tcp_stream.set_nodelay(true)?;
        log!(logfile, "Client connected: {}", addr);

        let registry = Arc::clone(&registry);
        let logfile = Arc::clone(&logfile);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(tcp_stream, addr, registry, Arc::clone(&logfile), verbose).await {
                log!(logfile, "[{}] TCP error: {}", addr, e);
            }
            log!(logfile, "Client disconnected: {}", addr);
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path);
    let logfile = open_log_file()?;

    let default_exercise = config.analysis.exercise()?;
    log!(logfile, "Coach Server ({})", env!("CARGO_PKG_VERSION"));
    log!(logfile, "Listen: {}", config.server.listen_addr);
    log!(logfile, "Default exercise: {}", default_exercise);
    log!(logfile, "Min visibility: {}", config.analysis.min_visibility);
    if config.server.verbose { log!(logfile, "Verbose mode: ON"); }

    let registry: SharedRegistry = Arc::new(Mutex::new(SessionRegistry::new(config.analysis.clone())));

    let bind_addr: SocketAddr = config.server.listen_addr.parse()
        .context("invalid listen_addr")?;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    log!(logfile, "Listening on {}", bind_addr);
    log!(logfile, "");

    accept_loop(listener, registry, logfile, config.server.verbose).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rep_coach::exercise::{pose_with_angles, ExerciseKind, Stage};
    use rep_coach::protocol::{recv_message, send_message, MessageStream};
    use tokio::net::{TcpListener, TcpStream};

    fn test_log(name: &str) -> LogFile {
        let path = std::env::temp_dir().join(format!("coach_{}_{}.log", name, std::process::id()));
        let file = std::fs::File::create(path).unwrap();
        Arc::new(Mutex::new(std::io::BufWriter::new(file)))
    }

    async fn start_server(name: &str) -> (SocketAddr, SharedRegistry) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let registry: SharedRegistry = Arc::new(Mutex::new(SessionRegistry::default()));
        tokio::spawn(accept_loop(listener, Arc::clone(&registry), test_log(name), false));
        (addr, registry)
    }

    async fn connect(addr: SocketAddr) -> MessageStream {
        protocol::message_stream(TcpStream::connect(addr).await.unwrap())
    }

    async fn request(stream: &mut MessageStream, msg: ClientMessage) -> ServerMessage {
        send_message(stream, &msg).await.unwrap();
        recv_message(stream).await.unwrap()
    }

    /// 懸垂のフレームを送る。`None` は人物なし
    async fn pullup_frame(stream: &mut MessageStream, session_id: &str, angle: Option<f32>) -> ServerMessage {
        let landmarks = angle
            .map(|a| pose_with_angles(ExerciseKind::PullUp, a, 180.0).landmarks.to_vec())
            .unwrap_or_default();
        let msg = ClientMessage::AnalyzeFrame {
            session_id: session_id.to_string(),
            exercise: ExerciseKind::PullUp,
            landmarks,
        };
        request(stream, msg).await
    }

    async fn wait_for_sessions(registry: &SharedRegistry, expected: usize) {
        for _ in 0..200 {
            if registry.lock().unwrap().len() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("registry never reached {} session(s)", expected);
    }

    fn report_of(reply: ServerMessage) -> (u32, Option<Stage>) {
        match reply {
            ServerMessage::Report { report, .. } => (report.count, report.stage),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_client_cannot_take_over_session() {
        let (addr, registry) = start_server("takeover").await;

        let mut alice = connect(addr).await;
        pullup_frame(&mut alice, "alice", Some(80.0)).await;
        let reply = pullup_frame(&mut alice, "alice", Some(170.0)).await;
        assert_eq!(report_of(reply), (1, Some(Stage::Down)));

        let mut other = connect(addr).await;
        let reply = pullup_frame(&mut other, "alice", None).await;
        assert!(matches!(reply, ServerMessage::Error { .. }));
        let reply = request(&mut other, ClientMessage::ResetCounter { session_id: "alice".into() }).await;
        assert!(matches!(reply, ServerMessage::Error { .. }));
        let reply = request(&mut other, ClientMessage::EndSession { session_id: "alice".into() }).await;
        assert!(matches!(reply, ServerMessage::Error { .. }));

        // 自分のセッションを作ってから切断する
        pullup_frame(&mut other, "bob", None).await;
        wait_for_sessions(&registry, 2).await;
        drop(other);
        wait_for_sessions(&registry, 1).await;

        let reply = pullup_frame(&mut alice, "alice", Some(80.0)).await;
        assert_eq!(report_of(reply), (1, Some(Stage::Up)));
    }

    #[tokio::test]
    async fn test_disconnect_ends_own_sessions() {
        let (addr, registry) = start_server("disconnect").await;

        let mut client = connect(addr).await;
        pullup_frame(&mut client, "s1", Some(80.0)).await;
        pullup_frame(&mut client, "s2", None).await;
        match request(&mut client, ClientMessage::Health).await {
            ServerMessage::Healthy { sessions, .. } => assert_eq!(sessions, 2),
            other => panic!("unexpected reply: {:?}", other),
        }
        drop(client);
        wait_for_sessions(&registry, 0).await;

        // 同じIDは新しい接続で最初から始まる
        let mut client = connect(addr).await;
        let reply = pullup_frame(&mut client, "s1", Some(170.0)).await;
        assert_eq!(report_of(reply), (0, None));
    }

    #[tokio::test]
    async fn test_end_session_returns_summary() {
        let (addr, _registry) = start_server("summary").await;

        let mut client = connect(addr).await;
        pullup_frame(&mut client, "s1", Some(80.0)).await;
        pullup_frame(&mut client, "s1", Some(170.0)).await;
        match request(&mut client, ClientMessage::EndSession { session_id: "s1".into() }).await {
            ServerMessage::SessionEnded { session_id, summary } => {
                assert_eq!(session_id, "s1");
                assert_eq!(summary.reps, 1);
                assert_eq!(summary.avg_score, Some(90.0));
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }
}
