//! RTP 송신자
//!
//! 수신자에 연결해 파일 전체를 전송하고 FIN으로 종료한다.
//!
//! 사용법:
//!   cargo run --release --bin rtp-sender -- <receiver ip> <receiver port> <file path> <window size> <mode> [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin rtp-sender -- 127.0.0.1 9000 data.bin 16 1
//!   cargo run --release --bin rtp-sender -- 127.0.0.1 9000 data.bin 16 0 --corrupt 0.05 --duplicate 0.02

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use tokio::fs::File;
use tokio::io::BufReader;
use tokio::net::UdpSocket;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rtp::{AckMode, Config, Connection, LossyChannel, SimulatorConfig};

const USAGE: &str = "Usage: rtp-sender <receiver ip> <receiver port> <file path> <window size> <mode> [--loss <p>] [--corrupt <p>] [--duplicate <p>] [--seed <n>]";

/// 송신자 실행 인자
struct SenderArgs {
    receiver_addr: SocketAddr,
    input_path: PathBuf,
    config: Config,
    simulator: SimulatorConfig,
}

fn fatal(message: impl std::fmt::Display) -> ! {
    error!("Sender: {}", message);
    std::process::exit(1);
}

fn parse_value<T: FromStr>(value: Option<&String>, name: &str) -> T {
    match value.map(|v| v.parse::<T>()) {
        Some(Ok(parsed)) => parsed,
        _ => fatal(format!("invalid {}\n{}", name, USAGE)),
    }
}

fn parse_args(args: &[String]) -> SenderArgs {
    if args.len() < 6 {
        fatal(USAGE);
    }

    let ip: IpAddr = parse_value(args.get(1), "receiver ip");
    let port: u16 = parse_value(args.get(2), "receiver port");
    let input_path = PathBuf::from(&args[3]);
    let window_size: usize = parse_value(args.get(4), "window size");
    let ack_mode: AckMode = parse_value(args.get(5), "mode");

    let mut simulator = SimulatorConfig::default();
    let mut i = 6;
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

    SenderArgs {
        receiver_addr: SocketAddr::new(ip, port),
        input_path,
        config: Config::new(window_size, ack_mode),
        simulator,
    }
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

    let file = File::open(&args.input_path)
        .await
        .unwrap_or_else(|e| fatal(format!("failed to open {}: {}", args.input_path.display(), e)));
    let mut source = BufReader::new(file);

    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
        .await
        .unwrap_or_else(|e| fatal(format!("failed to bind socket: {}", e)));
    let channel = LossyChannel::new(socket, args.simulator).unwrap_or_else(|e| fatal(e));
    if !args.simulator.is_noop() {
        info!("Sender: fault injection {:?}", args.simulator);
    }

    info!(
        "Sender: connecting to {} (window {}, mode {})",
        args.receiver_addr, args.config.window_size, args.config.ack_mode
    );

    let mut connection = Connection::connect(channel, args.receiver_addr, args.config)
        .await
        .unwrap_or_else(|e| fatal(e));

    if let Err(e) = connection.send_file(&mut source).await {
        info!("Sender: {}", connection.stats().summary());
        fatal(e);
    }

    if let Err(e) = connection.close().await {
        fatal(e);
    }

    debug!("Sender: exiting...");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fault_options() {
        let args: Vec<String> = [
            "rtp-sender", "127.0.0.1", "9000", "in.bin", "16", "0", "--duplicate", "0.5",
            "--corrupt", "0.05",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let parsed = parse_args(&args);

        assert_eq!(parsed.receiver_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(parsed.input_path, PathBuf::from("in.bin"));
        assert_eq!(parsed.config.ack_mode, AckMode::Cumulative);
        assert_eq!(parsed.simulator.duplicate_rate, 0.5);
        assert_eq!(parsed.simulator.corrupt_rate, 0.05);
        assert_eq!(parsed.simulator.loss_rate, 0.0);
    }
}
