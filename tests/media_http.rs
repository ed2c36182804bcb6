use std::io::{Read, Write};
use std::net::TcpStream;

use labworksd::media::spawn_static_server;

fn http_get(addr: std::net::SocketAddr, path: &str) -> (String, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).expect("connect");
    write!(
        stream,
        "GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n"
    )
    .expect("send request");

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).expect("read response");
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("header/body separator");
    let head = String::from_utf8_lossy(&raw[..split]).to_string();
    let body = raw[split + 4..].to_vec();
    (head, body)
}

#[test]
fn serves_stored_images_with_their_content_type() {
    let workspace = tempfile::tempdir().expect("workspace");
    let images = workspace.path().join("images");
    std::fs::create_dir_all(&images).expect("images dir");
    let payload = b"\x89PNG\r\n not really a png";
    std::fs::write(images.join("pic.png"), payload).expect("write image");

    let server = spawn_static_server(&images, "127.0.0.1", 0).expect("spawn");
    let addr = server.addr();

    let (head, body) = http_get(addr, "/images/pic.png");
    assert!(head.starts_with("HTTP/1.1 200"), "{head}");
    assert!(head.to_ascii_lowercase().contains("content-type: image/png"), "{head}");
    assert_eq!(body, payload);

    let (head, _) = http_get(addr, "/images/no-such-file.png");
    assert!(head.starts_with("HTTP/1.1 404"), "{head}");

    server.stop();
}

#[test]
fn refuses_to_leave_the_images_directory() {
    let workspace = tempfile::tempdir().expect("workspace");
    let images = workspace.path().join("images");
    std::fs::create_dir_all(&images).expect("images dir");
    std::fs::write(workspace.path().join("secret.txt"), b"do not serve").expect("write secret");

    let server = spawn_static_server(&images, "127.0.0.1", 0).expect("spawn");

    // Rejected either by the router or by the filename check; all that
    // matters is that nothing outside the directory is readable.
    let (head, body) = http_get(server.addr(), "/images/..%2Fsecret.txt");
    assert!(head.starts_with("HTTP/1.1 4"), "{head}");
    assert!(!body.windows(12).any(|w| w == b"do not serve"));

    server.stop();
}
