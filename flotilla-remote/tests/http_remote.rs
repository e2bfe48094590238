//! `HttpRemote` status mapping against a scripted local HTTP server.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use flotilla_core::{BuildHandle, InstanceRef, InstanceSpec, SubscriptionId};
use flotilla_remote::{
    BuildStatus, Credentials, HttpRemote, ProfileDescriptor, ProfileName, PutOutcome, RemoteApi,
    RemoteError, Session,
};

const SUB: &str = "sub-0000000000000000";

/// Answers one connection per scripted `(status, body)` pair and returns the
/// lowercased request heads it saw.
async fn serve(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let base_url = format!("http://{}", listener.local_addr().expect("addr"));
    let server = tokio::spawn(async move {
        let mut heads = Vec::new();
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().await.expect("accept");
            heads.push(read_request(&mut stream).await);
            let length = if status == 204 {
                String::new()
            } else {
                format!("content-length: {}\r\n", body.len())
            };
            let response = format!(
                "HTTP/1.1 {status} Scripted\r\ncontent-type: application/json\r\n{length}connection: close\r\n\r\n{body}"
            );
            stream.write_all(response.as_bytes()).await.expect("write");
            stream.shutdown().await.expect("shutdown");
        }
        heads
    });
    (base_url, server)
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.expect("read");
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
        let body_len = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + body_len {
            return head;
        }
    }
    String::from_utf8_lossy(&buf).to_lowercase()
}

fn session(base_url: &str) -> Session {
    Session::new(
        ProfileName::Default,
        Credentials {
            token: "tok-1".to_string(),
            profile: ProfileDescriptor {
                base_url: format!("{base_url}/"),
                account: "acc-1".to_string(),
                subscription: None,
            },
        },
    )
}

fn sub() -> SubscriptionId {
    SUB.parse().expect("subscription")
}

fn handle() -> BuildHandle {
    BuildHandle {
        subscription_id: SUB.to_string(),
        boundary_id: "b".to_string(),
        function_id: "f".to_string(),
        build_id: "build-7".to_string(),
    }
}

#[tokio::test]
async fn put_maps_ok_to_applied_and_created_to_building() {
    let (base_url, server) = serve(vec![
        (200, "{}"),
        (
            201,
            r#"{"subscriptionId":"sub-0000000000000000","boundaryId":"b","functionId":"f","buildId":"build-7"}"#,
        ),
    ])
    .await;
    let remote = HttpRemote::new();
    let session = session(&base_url);
    let instance = InstanceRef::new("b", "f");

    let first = remote
        .put_function(&session, &sub(), &instance, &InstanceSpec::default())
        .await
        .expect("put 200");
    assert_eq!(first, PutOutcome::Applied);
    let second = remote
        .put_function(&session, &sub(), &instance, &InstanceSpec::default())
        .await
        .expect("put 201");
    assert_eq!(second, PutOutcome::Building(handle()));

    let heads = server.await.expect("server");
    assert!(heads[0].starts_with(
        "put /v1/account/acc-1/subscription/sub-0000000000000000/boundary/b/function/f http/1.1"
    ));
    for head in &heads {
        assert!(head.contains("authorization: bearer tok-1"));
    }
}

#[tokio::test]
async fn put_with_other_success_statuses_is_rejected() {
    let (base_url, server) = serve(vec![(202, r#"{"message":"queued"}"#), (204, "")]).await;
    let remote = HttpRemote::new();
    let session = session(&base_url);
    let instance = InstanceRef::new("b", "f");

    let accepted = remote
        .put_function(&session, &sub(), &instance, &InstanceSpec::default())
        .await
        .expect_err("202");
    assert!(matches!(
        accepted,
        RemoteError::Rejected { status: 202, ref message } if message == "queued"
    ));
    let empty = remote
        .put_function(&session, &sub(), &instance, &InstanceSpec::default())
        .await
        .expect_err("204");
    assert!(matches!(empty, RemoteError::Rejected { status: 204, .. }));
    server.await.expect("server");
}

#[tokio::test]
async fn build_status_is_pending_only_while_created() {
    let (base_url, server) = serve(vec![(201, "{}"), (200, "{}"), (500, "oops")]).await;
    let remote = HttpRemote::new();
    let session = session(&base_url);

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(remote.build_status(&session, &handle()).await.expect("status"));
    }
    assert_eq!(
        seen,
        [
            BuildStatus::Pending,
            BuildStatus::Resolved(200),
            BuildStatus::Resolved(500)
        ]
    );

    let heads = server.await.expect("server");
    assert!(heads[0].starts_with(
        "get /v1/account/acc-1/subscription/sub-0000000000000000/boundary/b/function/f/build/build-7 http/1.1"
    ));
    assert!(heads
        .iter()
        .all(|head| head.contains("authorization: bearer tok-1")));
}
