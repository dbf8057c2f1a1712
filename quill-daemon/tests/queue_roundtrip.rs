//! Notes sent over the socket land in a real bare remote in arrival order.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use quill_core::config::parse_allowed_ids;
use quill_core::Config;
use quill_daemon::paths::socket_path;
use quill_daemon::{request_note, request_status, request_stop};
use tempfile::TempDir;

const OWNER: i64 = 77;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=seed", "-c", "user.email=seed@localhost"])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn bare_remote(root: &Path) -> PathBuf {
    let remote = root.join("remote.git");
    let seed = root.join("seed");
    git(root, &["init", "--bare", remote.to_str().unwrap()]);
    git(root, &["clone", remote.to_str().unwrap(), seed.to_str().unwrap()]);
    std::fs::write(seed.join("README.md"), "# notes\n").unwrap();
    git(&seed, &["add", "README.md"]);
    git(&seed, &["commit", "-m", "seed"]);
    git(&seed, &["push", "origin", "HEAD:main"]);
    git(
        root,
        &["--git-dir", remote.to_str().unwrap(), "symbolic-ref", "HEAD", "refs/heads/main"],
    );
    remote
}

async fn wait_for_socket(home: &Path) {
    let socket = socket_path(home);
    for _ in 0..100 {
        if socket.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("daemon socket never appeared at {}", socket.display());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn notes_through_daemon_land_in_order() {
    let tmp = TempDir::new().expect("tempdir");
    let home = tmp.path().join("home");
    std::fs::create_dir_all(&home).unwrap();
    let remote = bare_remote(tmp.path());

    let mut config = Config::defaults_at(&home);
    config.remote_url = Some(remote.to_string_lossy().into_owned());
    config.ssh_key_path = None;
    config.allowed_ids = parse_allowed_ids(&OWNER.to_string());

    let daemon = tokio::spawn(quill_daemon::run(home.clone(), config));
    wait_for_socket(&home).await;

    let client_home = home.clone();
    let responses = tokio::task::spawn_blocking(move || {
        ["alpha idea", "beta idea", "gamma idea"]
            .into_iter()
            .map(|text| request_note(&client_home, OWNER, text).expect("note"))
            .collect::<Vec<_>>()
    })
    .await
    .unwrap();
    for response in &responses {
        assert_eq!(response["sync"]["ok"], serde_json::json!(true), "{response}");
    }

    let status_home = home.clone();
    let status = tokio::task::spawn_blocking(move || request_status(&status_home).expect("status"))
        .await
        .unwrap();
    assert_eq!(status["processed"], serde_json::json!(3));
    assert_eq!(status["repo"]["state"], serde_json::json!("ready"));

    let log = git(
        tmp.path(),
        &["--git-dir", remote.to_str().unwrap(), "log", "--format=%s", "main"],
    );
    let subjects: Vec<&str> = log.lines().take(3).collect();
    assert_eq!(
        subjects,
        [
            "Added idea: gamma_idea.md",
            "Added idea: beta_idea.md",
            "Added idea: alpha_idea.md",
        ]
    );

    let stop_home = home.clone();
    tokio::task::spawn_blocking(move || request_stop(&stop_home).expect("stop"))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), daemon)
        .await
        .expect("daemon exits after stop")
        .expect("join")
        .expect("clean shutdown");
}
