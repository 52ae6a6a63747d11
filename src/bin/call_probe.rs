use futures_util::{SinkExt, StreamExt};
use parla::common::protocol::{CallRef, ClientEvent, InitiateCall, ServerEvent};
use parla::server::config::ClientConfig;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn open(base: &str, user: &str) -> anyhow::Result<Socket> {
    let (socket, _) = connect_async(format!("{}/?userId={}", base.trim_end_matches('/'), user)).await?;
    Ok(socket)
}

async fn send(socket: &mut Socket, event: &ClientEvent) -> anyhow::Result<()> {
    socket.send(Message::Text(serde_json::to_string(event)?)).await?;
    Ok(())
}

/// Waits for the next signaling event, skipping control frames.
async fn next_event(socket: &mut Socket) -> anyhow::Result<Option<ServerEvent>> {
    loop {
        let frame = match tokio::time::timeout(Duration::from_secs(5), socket.next()).await {
            Ok(Some(frame)) => frame?,
            Ok(None) | Err(_) => return Ok(None),
        };
        if let Message::Text(text) = frame {
            return Ok(Some(ServerEvent::parse(&text)?));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = ClientConfig::from_env();
    println!("Using socket {}", cfg.socket_url);

    let mut caller = open(&cfg.socket_url, "probe-caller").await?;
    println!("CALLER -> {:?}", next_event(&mut caller).await?);
    let mut callee = open(&cfg.socket_url, "probe-callee").await?;
    println!("CALLEE -> {:?}", next_event(&mut callee).await?);
    println!("CALLER -> {:?}", next_event(&mut caller).await?);

    let call_id = format!("probe-{}", uuid::Uuid::new_v4().simple());
    send(
        &mut caller,
        &ClientEvent::InitiateCall(InitiateCall {
            receiver_id: "probe-callee".to_string(),
            call_id: call_id.clone(),
            caller_name: Some("Probe".to_string()),
            caller_image: None,
        }),
    )
    .await?;
    println!("INCOMING -> {:?}", next_event(&mut callee).await?);

    send(&mut callee, &ClientEvent::AcceptCall(CallRef::new(call_id.clone()))).await?;
    println!("ACCEPTED -> {:?}", next_event(&mut caller).await?);

    send(&mut caller, &ClientEvent::EndCall(CallRef::new(call_id))).await?;
    println!("ENDED -> {:?}", next_event(&mut callee).await?);

    caller.close(None).await?;
    callee.close(None).await?;
    Ok(())
}
