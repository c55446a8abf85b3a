//! End-to-end flows against a spawned server.

mod common;

use common::{TestClient, TestServer};

#[tokio::test]
async fn registration_channels_and_quit() {
    let server = TestServer::spawn(16667).await.expect("spawn server");

    let mut alice = TestClient::connect(&server.address()).await.expect("alice");
    alice.register("alice").await.expect("alice registers");
    // The burst ends with the MOTD side effect (nothing configured -> 422).
    alice.recv_until(" 422 ").await.expect("motd");

    let mut bob = TestClient::connect(&server.address()).await.expect("bob");
    bob.register("bob").await.expect("bob registers");

    alice.send("JOIN #t").await.unwrap();
    alice.recv_until("JOIN").await.expect("join echo");
    bob.send("JOIN #t").await.unwrap();
    bob.recv_until(" 366 ").await.expect("names burst");

    alice.send("PRIVMSG #t :hello from alice").await.unwrap();
    let relayed = bob.recv_until("PRIVMSG").await.expect("relay");
    assert!(relayed.starts_with(":alice!alice@"), "{relayed}");
    assert!(relayed.ends_with("PRIVMSG #t :hello from alice"), "{relayed}");

    alice.send("QUIT :done here").await.unwrap();
    let quit = bob.recv_until("QUIT").await.expect("quit fanout");
    assert!(quit.starts_with(":alice!alice@"), "{quit}");
    assert!(quit.ends_with("QUIT :Quit: done here"), "{quit}");
}

#[tokio::test]
async fn sasl_plain_over_the_wire() {
    let hash = bcrypt::hash("hunter2", 4).expect("bcrypt hash");
    let datastore = serde_json::json!({
        "account.bob": {
            "credentials": { "passphrase": hash },
            "verified": true,
        }
    })
    .to_string();

    let server = TestServer::spawn_with(16668, "", &datastore)
        .await
        .expect("spawn server");

    let mut client = TestClient::connect(&server.address()).await.expect("client");

    client.send("CAP LS 302").await.unwrap();
    let ls = client.recv_until("CAP * LS").await.expect("cap ls");
    assert!(ls.contains("sasl=PLAIN"), "{ls}");

    client.send("NICK bob").await.unwrap();
    client.send("USER bob 0 * :Bob").await.unwrap();
    client.send("CAP REQ :sasl").await.unwrap();
    client.recv_until("ACK").await.expect("ack");

    client.send("AUTHENTICATE PLAIN").await.unwrap();
    client.recv_until("AUTHENTICATE +").await.expect("challenge");

    // base64("\0bob\0hunter2")
    client.send("AUTHENTICATE AGJvYgBodW50ZXIy").await.unwrap();
    let login = client.recv_until(" 900 ").await.expect("logged in");
    assert!(login.ends_with("bob :You are now logged in as bob"), "{login}");
    client.recv_until(" 903 ").await.expect("sasl success");

    client.send("CAP END").await.unwrap();
    let welcome = client.recv_until(" 001 ").await.expect("welcome");
    assert!(welcome.contains("Welcome to the TestNet IRC Network"), "{welcome}");
}
