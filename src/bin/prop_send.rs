//! Send one control request to a prop and print the reply.
//!
//!     prop-send <host[:port]> <action> [key=value ...]
//!     prop-send <host> sacn <universe> <r> <g> <b> [count]
//!
//! Values are parsed as JSON where possible, so `r=255` sends a number and
//! `loop=true` a boolean.

use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Error};
use common::DEFAULT_CONTROL_PORT;
use prop_runtime::dmx::pack::{build_packet, SACN_PORT};
use serde_json::{Map, Value};
use tokio::net::UdpSocket;

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

fn usage() -> Error {
    anyhow!(
        "usage: prop-send <host[:port]> <action> [key=value ...]\n       \
         prop-send <host> sacn <universe> <r> <g> <b> [count]"
    )
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, Error> {
    let target = if host.contains(':') {
        host.to_string()
    } else {
        format!("{}:{}", host, port)
    };
    target
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow!("could not resolve {}", host))
}

fn request(action: &str, args: &[String]) -> Result<Value, Error> {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis();
    let mut body = Map::new();
    body.insert("action".into(), action.into());
    body.insert("commandId".into(), format!("cli-{}", millis).into());

    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=value, got {}", arg))?;
        let value =
            serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        body.insert(key.to_string(), value);
    }
    Ok(Value::Object(body))
}

async fn send_control(target: SocketAddr, body: Value) -> Result<(), Error> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_broadcast(true)?;
    socket.send_to(&serde_json::to_vec(&body)?, target).await?;

    let mut buf = vec![0u8; 4096];
    match tokio::time::timeout(REPLY_TIMEOUT, socket.recv_from(&mut buf)).await {
        Ok(received) => {
            let (len, from) = received?;
            let reply: Value = serde_json::from_slice(&buf[..len])
                .with_context(|| format!("reply from {} is not JSON", from))?;
            println!("{}: {}", from, serde_json::to_string_pretty(&reply)?);
        }
        Err(_) => println!("No reply within {:?}", REPLY_TIMEOUT),
    }
    Ok(())
}

async fn send_sacn(host: &str, args: &[String]) -> Result<(), Error> {
    let numbers = args
        .iter()
        .map(|a| a.parse::<u16>())
        .collect::<Result<Vec<_>, _>>()
        .context("sacn arguments must be numbers")?;
    let (universe, rgb, count) = match numbers.as_slice() {
        [universe, r, g, b] => (*universe, [*r, *g, *b], 30),
        [universe, r, g, b, count] => (*universe, [*r, *g, *b], *count as usize),
        _ => return Err(usage()),
    };
    let rgb = rgb
        .iter()
        .map(|c| u8::try_from(*c))
        .collect::<Result<Vec<u8>, _>>()
        .context("colour channels must be 0-255")?;
    if count * 3 > 512 {
        bail!("{} fixtures do not fit in one universe", count);
    }

    let slots: Vec<u8> = rgb.iter().copied().cycle().take(count * 3).collect();
    let packet = build_packet(universe, 0, "prop-send", &slots)
        .map_err(|e| anyhow!("could not build packet: {:?}", e))?;

    let target = resolve(host, SACN_PORT)?;
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.send_to(&packet, target).await?;
    println!(
        "Sent {} byte sACN frame for universe {} to {}",
        packet.len(),
        universe,
        target
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [host, action, rest @ ..] = args.as_slice() else {
        return Err(usage());
    };

    if action == "sacn" {
        return send_sacn(host, rest).await;
    }
    let target = resolve(host, DEFAULT_CONTROL_PORT)?;
    send_control(target, request(action, rest)?).await
}
