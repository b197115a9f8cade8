use anyhow::Context as _;
use async_trait::async_trait;
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt as _, StreamExt as _,
};
use log::trace;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

use crate::connection::{Link, Transport};

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Talks to the rover over a websocket, one text message per command.
pub struct WebSocket;

/// The rover is usually configured as a bare `host:port`.
pub fn ws_url(address: &str) -> String {
    if address.contains("://") {
        address.to_owned()
    } else {
        format!("ws://{address}")
    }
}

#[async_trait]
impl Transport for WebSocket {
    async fn connect(&mut self, address: &str) -> anyhow::Result<Box<dyn Link>> {
        let url = ws_url(address);
        let (stream, _) = connect_async(&url)
            .await
            .with_context(|| format!("failed to connect websocket: {url}"))?;
        let (sink, stream) = stream.split();
        Ok(Box::new(WebSocketLink { sink, stream }))
    }
}

struct WebSocketLink {
    sink: SplitSink<Stream, Message>,
    stream: SplitStream<Stream>,
}

#[async_trait]
impl Link for WebSocketLink {
    async fn pump(
        &mut self,
        outgoing: &mut mpsc::UnboundedReceiver<String>,
    ) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                msg = outgoing.recv() => match msg {
                    Some(text) => {
                        trace!("sending {text}");
                        self.sink.send(Message::Text(text)).await?;
                    }
                    None => {
                        let _ = self.sink.close().await;
                        return Ok(());
                    }
                },
                incoming = self.stream.next() => match incoming {
                    None | Some(Ok(Message::Close(_))) => return Ok(()),
                    // The rover doesn't talk back; tungstenite answers pings for us.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
            }
        }
    }
}
