use log::{debug, trace};
use once_cell::sync::Lazy;
use std::{
    io, iter,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};
use tokio::{net::UdpSocket, time::timeout};

const TYPE_A: u16 = 0x0001;
const CLASS_IN: u16 = 0x0001;
const NAMESERVER_TIMEOUT: Duration = Duration::from_secs(2);

/// Nameservers listed in the system resolver configuration.
pub(crate) static SYSTEM_NAMESERVERS: Lazy<Vec<SocketAddr>> = Lazy::new(|| {
    // find name servers (platform-dependent)
    #[cfg(unix)]
    {
        std::fs::read_to_string("/etc/resolv.conf")
            .map(|resolv| parse_resolv_conf(&resolv))
            .unwrap_or_default()
    }
    #[cfg(not(unix))]
    {
        Vec::new()
    }
});

/// Resolve a host name to an address.
///
/// IP literals and `localhost` never touch the network. Other names are asked of each
/// nameserver in turn; if none of them answers with an A record the system resolver is used.
pub(crate) async fn resolve(name: &str, nameservers: &[SocketAddr]) -> Result<IpAddr, io::Error> {
    if let Ok(ip) = name.parse::<IpAddr>() {
        return Ok(ip);
    }
    if name.eq_ignore_ascii_case("localhost") {
        return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    for server in nameservers {
        let message = query(name, rand::random());
        match timeout(NAMESERVER_TIMEOUT, ask(*server, &message)).await {
            Ok(Ok(Some(ip))) => {
                trace!("{name} resolved to {ip} by {server}");
                return Ok(ip);
            }
            Ok(Ok(None)) => debug!("{server} has no A record for {name}"),
            Ok(Err(e)) => debug!("nameserver {server} failed for {name}: {e}"),
            Err(_) => debug!("nameserver {server} timed out for {name}"),
        }
    }

    tokio::net::lookup_host((name, 0))
        .await?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("cannot resolve {name}")))
}

async fn ask(server: SocketAddr, message: &[u8]) -> Result<Option<IpAddr>, io::Error> {
    let local: SocketAddr = if server.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(server).await?;
    socket.send(message).await?;

    let mut buf = vec![0u8; 512];
    let n = socket.recv(&mut buf).await?;
    buf.truncate(n);

    answer(&buf, message)
}

/// Build an A/IN query: [id, flags, questions, answers, authority, additional] + name + [qtype, qclass].
fn query(name: &str, id: u16) -> Vec<u8> {
    let header: [u16; 6] = [id, 0x0100, 0x0001, 0x0000, 0x0000, 0x0000].map(u16::to_be);
    let question: [u16; 2] = [TYPE_A, CLASS_IN].map(u16::to_be);

    // convert query to standard dns name notation (max 63 characters for each label)
    let ascii = name.chars().filter(char::is_ascii).collect::<String>();
    let labels = ascii
        .trim_end_matches('.')
        .split('.')
        .flat_map(|l| {
            iter::once(u8::try_from(l.len()).unwrap_or(63).min(63)).chain(l.bytes().take(63))
        })
        .chain(iter::once(0));

    let mut message = bytemuck::cast::<[u16; 6], [u8; 12]>(header).to_vec();
    message.extend(labels);
    message.extend(bytemuck::cast_slice::<u16, u8>(&question));
    message
}

/// Pick the first A record out of the response to `question`, a message built by [`query`].
///
/// The response must echo the id and the question of the query.
fn answer(buf: &[u8], question: &[u8]) -> Result<Option<IpAddr>, io::Error> {
    let malformed = || io::Error::new(io::ErrorKind::InvalidData, "malformed dns response");

    let header = buf.get(..12).ok_or_else(malformed)?;
    let [_, flags, _, count, _, _] = bytemuck::pod_read_unaligned::<[u16; 6]>(header).map(u16::from_be);
    if buf.get(..2) != question.get(..2) || flags & 0x8000 == 0 {
        return Err(malformed());
    }
    let echoed = buf.get(12..question.len()).ok_or_else(malformed)?;
    if !question.get(12..).is_some_and(|q| q.eq_ignore_ascii_case(echoed)) {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "dns response to another question"));
    }
    if flags & 0x000f != 0 {
        return Ok(None);
    }

    // answers start right after the echoed question
    let mut at = question.len();
    for _ in 0..count {
        at = skip_name(buf, at).ok_or_else(malformed)?;
        let fixed = buf.get(at..at + 10).ok_or_else(malformed)?;
        let kind = u16::from_be_bytes([fixed[0], fixed[1]]);
        let class = u16::from_be_bytes([fixed[2], fixed[3]]);
        let length = usize::from(u16::from_be_bytes([fixed[8], fixed[9]]));
        at += 10;
        let data = buf.get(at..at + length).ok_or_else(malformed)?;
        if kind == TYPE_A && class == CLASS_IN && length == 4 {
            return Ok(Some(IpAddr::V4(Ipv4Addr::new(data[0], data[1], data[2], data[3]))));
        }
        at += length;
    }
    Ok(None)
}

/// Offset just past a (possibly compressed) domain name.
fn skip_name(buf: &[u8], mut at: usize) -> Option<usize> {
    loop {
        let len = *buf.get(at)?;
        match len {
            0 => return Some(at + 1),
            l if l & 0xc0 == 0xc0 => return Some(at + 2),
            l => at += 1 + usize::from(l),
        }
    }
}

fn parse_resolv_conf(resolv: &str) -> Vec<SocketAddr> {
    resolv
        .lines()
        .filter_map(|l| l.trim().strip_prefix("nameserver"))
        .filter_map(|ns| ns.trim().split('%').next()?.parse::<IpAddr>().ok())
        .map(|ip| SocketAddr::new(ip, 53))
        .collect()
}
