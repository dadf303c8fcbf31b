use shared::{Message, DEFAULT_PORT};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("127.0.0.1:{}", DEFAULT_PORT));

    println!("Connecting to {}", addr);
    let stream = TcpStream::connect(&addr).await?;
    let (read_half, mut write_half) = stream.into_split();

    // Print everything the server pushes at us, as it arrives.
    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match Message::decode(&line) {
                Ok(message) => println!("<- {:?}", message),
                Err(e) => println!("<- undecodable frame '{}': {}", line, e),
            }
        }
        println!("Server closed the connection");
    });

    let send = |message: Message| {
        let frame = message.encode();
        println!("-> {:?}", message);
        frame
    };

    write_half
        .write_all(send(Message::Nick {
            name: "tester".to_string(),
        })
        .as_bytes())
        .await?;

    // Walk a small circle so other clients see us move.
    for i in 0..10 {
        let angle = i as f32 / 5.0;
        let position = Message::Position {
            x: angle.cos() * 8.0,
            y: 0.0,
            z: angle.sin() * 8.0,
            rx: angle,
            ry: 0.0,
        };
        write_half.write_all(send(position).as_bytes()).await?;
        sleep(Duration::from_millis(500)).await;
    }

    write_half
        .write_all(send(Message::talk("/list")).as_bytes())
        .await?;
    write_half
        .write_all(send(Message::talk("hello from the test client")).as_bytes())
        .await?;
    write_half
        .write_all(send(Message::Block {
            p: 0,
            q: 0,
            x: 1,
            y: 10,
            z: 1,
            w: 3,
        })
        .as_bytes())
        .await?;

    // Give the reader a moment to drain replies before hanging up.
    sleep(Duration::from_secs(1)).await;
    println!("Test client finished");

    Ok(())
}
