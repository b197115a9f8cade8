use anyhow::Context as _;
use clap::Parser;
use futures::StreamExt as _;
use log::{info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use crate::drive::Chassis;

mod drive;

/// A stand-in for the rover: accepts a controller over a websocket and
/// logs what the motors would be doing.
#[derive(Parser)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:81")]
    listen: String,
}

/// Runs the motors from one controller's commands until it goes away.
async fn serve(stream: TcpStream, chassis: &mut Chassis) -> anyhow::Result<()> {
    let mut ws = tokio_tungstenite::accept_async(stream)
        .await
        .context("websocket handshake failed")?;

    while let Some(msg) = ws.next().await {
        match msg? {
            Message::Text(text) => {
                chassis.apply(&text);
                info!("{text} => {:?}", chassis.drive());
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let listener = TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("failed to listen on {}", args.listen))?;
    info!("listening on {}", args.listen);

    let mut chassis = Chassis::default();
    // One controller at a time; anyone else waits in the accept queue.
    loop {
        let (stream, peer) = listener.accept().await?;
        info!("controller connected from {peer}");

        if let Err(e) = serve(stream, &mut chassis).await {
            warn!("connection from {peer} failed: {e:#}");
        }

        // Don't keep driving blind.
        chassis.stop();
        info!("controller {peer} disconnected, motors stopped");
    }
}
