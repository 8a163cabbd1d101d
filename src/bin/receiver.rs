//! RTP 수신자
//!
//! SYN을 기다려 연결을 수립하고, 받은 데이터를 파일에 기록한 뒤 FIN|ACK로 종료한다.
//!
//! 사용법:
//!   cargo run --release --bin rtp-receiver -- <listen port> <file path> <window size> <mode> [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin rtp-receiver -- 9000 received.bin 16 1
//!   cargo run --release --bin rtp-receiver -- 9000 received.bin 16 0 --loss 0.1 --seed 42

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::UdpSocket;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rtp::{AckMode, Channel, Config, Connection, LossyChannel, SimulatorConfig};

const USAGE: &str =
    "Usage: rtp-receiver <listen port> <file path> <window size> <mode> [--loss <p>] [--corrupt <p>] [--duplicate <p>] [--seed <n>]";

/// 수신자 실행 인자
struct ReceiverArgs {
    port: u16,
    output_path: PathBuf,
    config: Config,
    simulator: SimulatorConfig,
}

fn fatal(message: impl std::fmt::Display) -> ! {
    error!("Receiver: {}", message);
    std::process::exit(1);
}

fn parse_value<T: FromStr>(value: Option<&String>, name: &str) -> T {
    match value.map(|v| v.parse::<T>()) {
        Some(Ok(parsed)) => parsed,
        _ => fatal(format!("invalid {}\n{}", name, USAGE)),
    }
}

fn parse_args(args: &[String]) -> ReceiverArgs {
    if args.len() < 5 {
        fatal(USAGE);
    }

    let port = parse_value(args.get(1), "listen port");
    let output_path = PathBuf::from(&args[2]);
    let window_size: usize = parse_value(args.get(3), "window size");
    let ack_mode: AckMode = parse_value(args.get(4), "mode");

    let mut simulator = SimulatorConfig::default();
    let mut i = 5;
    while i < args.len() {
        match args[i].as_str() {
            "--loss" => simulator.loss_rate = parse_value(args.get(i + 1), "--loss"),
            "--corrupt" => simulator.corrupt_rate = parse_value(args.get(i + 1), "--corrupt"),
            "--duplicate" => simulator.duplicate_rate = parse_value(args.get(i + 1), "--duplicate"),
            "--seed" => simulator.seed = parse_value(args.get(i + 1), "--seed"),
            other => fatal(format!("unknown option: {}\n{}", other, USAGE)),
        }
        i += 2;
    }

    ReceiverArgs {
        port,
        output_path,
        config: Config::new(window_size, ack_mode),
        simulator,
    }
}

/// 연결 수립 후 출력 파일 생성
///
/// 핸드쉐이크가 실패하면 파일은 만들어지지 않는다.
async fn open_session<C: Channel>(
    channel: C,
    config: Config,
    output_path: &Path,
) -> rtp::Result<(Connection<C>, BufWriter<File>)> {
    let connection = Connection::accept(channel, config).await?;
    let file = File::create(output_path).await?;
    Ok((connection, BufWriter::new(file)))
}

#[tokio::main]
async fn main() {
    // 로깅 설정 (RUST_LOG, 기본 info)
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("logging setup failed: {}", e);
    }

    let args = parse_args(&std::env::args().collect::<Vec<_>>());
    if let Err(e) = args.config.validate() {
        fatal(e);
    }

    let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port));
    let socket = UdpSocket::bind(bind_addr)
        .await
        .unwrap_or_else(|e| fatal(format!("failed to bind {}: {}", bind_addr, e)));
    let channel = LossyChannel::new(socket, args.simulator).unwrap_or_else(|e| fatal(e));
    if !args.simulator.is_noop() {
        info!("Receiver: fault injection {:?}", args.simulator);
    }

    info!(
        "Receiver: listening on {} (window {}, mode {})",
        bind_addr, args.config.window_size, args.config.ack_mode
    );

    let (mut connection, mut sink) = open_session(channel, args.config, &args.output_path)
        .await
        .unwrap_or_else(|e| fatal(e));

    if let Err(e) = connection.receive_file(&mut sink).await {
        // 이미 순서대로 받은 데이터는 디스크에 남긴다
        if let Err(flush_err) = sink.flush().await {
            error!("Receiver: flush failed: {}", flush_err);
        }
        info!("Receiver: {}", connection.stats().summary());
        fatal(e);
    }

    if let Err(e) = sink.shutdown().await {
        fatal(format!("failed to close {}: {}", args.output_path.display(), e));
    }

    if let Err(e) = connection.close().await {
        fatal(e);
    }

    debug!("Receiver: exiting...");
}
