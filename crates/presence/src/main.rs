// tandem-presence-sim: two in-process replicas exchanging presence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tandem_common::path::{DocumentPoint, DocumentRange};
use tandem_common::tree::{Document, DocumentTree, Node};
use tandem_common::types::LocalIdentity;
use tandem_presence::channel::AwarenessChannel;
use tandem_presence::config::GlobalConfig;
use tandem_presence::session::driver::{spawn_session, SessionCommand, SessionHandle};
use tandem_presence::session::PresenceSession;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;
use yrs::sync::Message;

#[derive(Parser)]
#[command(name = "tandem-presence-sim", about = "Simulate presence sync between two replicas")]
struct Args {
    /// Config file for the local replica (defaults to ~/.tandem/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON document (array of nodes) shared by both replicas.
    #[arg(long)]
    document: Option<PathBuf>,

    /// Display name of the simulated peer.
    #[arg(long, default_value = "Bob")]
    peer_name: String,

    /// Number of cursor moves the local replica makes.
    #[arg(long, default_value_t = 20)]
    moves: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => GlobalConfig::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => GlobalConfig::load(),
    };
    let document = match &args.document {
        Some(path) => load_document(path)?,
        None => sample_document(),
    };

    let local = config.identity().unwrap_or_else(|| LocalIdentity {
        user_id: format!("user-{}", Uuid::new_v4()),
        display_name: "Alice".into(),
        avatar_url: String::new(),
    });
    let peer = LocalIdentity {
        user_id: format!("user-{}", Uuid::new_v4()),
        display_name: args.peer_name.clone(),
        avatar_url: String::new(),
    };

    let (local_out_tx, local_out_rx) = mpsc::channel(256);
    let (peer_out_tx, peer_out_rx) = mpsc::channel(256);
    let local_handle = spawn_session(
        PresenceSession::new(
            AwarenessChannel::new(yrs::Doc::new(), Uuid::new_v4().to_string()),
            config.dispatcher_config(),
        )
        .with_document(document.clone()),
        local_out_tx,
    );
    let peer_handle = spawn_session(
        PresenceSession::new(
            AwarenessChannel::new(yrs::Doc::new(), Uuid::new_v4().to_string()),
            config.dispatcher_config(),
        )
        .with_document(document.clone()),
        peer_out_tx,
    );
    tokio::spawn(relay(local_out_rx, peer_handle.commands()));
    tokio::spawn(relay(peer_out_rx, local_handle.commands()));

    info!(user_id = %local.user_id, moves = args.moves, "starting simulation");
    local_handle.publish_identity(local.clone()).await;
    peer_handle.publish_identity(peer).await;

    let carets = first_leaf_carets(&document);
    for offset in 0..args.moves {
        let Some(caret) = carets.get(offset % carets.len().max(1)) else {
            break;
        };
        local_handle.publish_cursor(local.clone(), caret.clone()).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let settle = config.dispatcher_config().debounce.window * 3;
    tokio::time::sleep(settle).await;
    print_views("peer view after cursor moves", &peer_handle)?;

    local_handle.clear().await;
    tokio::time::sleep(settle).await;
    print_views("peer view after local clear", &peer_handle)?;

    local_handle.shutdown().await;
    peer_handle.shutdown().await;
    Ok(())
}

async fn relay(mut rx: mpsc::Receiver<Message>, tx: mpsc::Sender<SessionCommand<Document>>) {
    while let Some(message) = rx.recv().await {
        if tx.send(SessionCommand::Remote(message)).await.is_err() {
            break;
        }
    }
}

fn print_views(label: &str, handle: &SessionHandle<Document>) -> anyhow::Result<()> {
    let users = handle.active_users().borrow().clone();
    let cursors = handle.remote_cursors().borrow().clone();
    let report = serde_json::json!({ "active_users": users, "remote_cursors": cursors });
    println!("{label}:");
    println!("{}", serde_json::to_string_pretty(&report).context("failed to render views")?);
    Ok(())
}

fn load_document(path: &Path) -> anyhow::Result<Document> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read document {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw).context("document is not valid JSON")?;
    Document::from_json(value).context("document does not match the node schema")
}

fn sample_document() -> Document {
    Document::new(vec![
        Node::block("intro", vec![Node::marker(), Node::leaf("Hello "), Node::leaf("world")]),
        Node::block("body", vec![Node::leaf("Presence travels over awareness.")]),
    ])
}

/// Collapsed carets at every offset of the first leaf in the first block.
fn first_leaf_carets(document: &Document) -> Vec<DocumentRange> {
    let Some(block) = document.root().child(0) else {
        return Vec::new();
    };
    let Some((index, leaf)) = block.children().iter().enumerate().find(|(_, node)| node.is_leaf())
    else {
        return Vec::new();
    };
    let len = match leaf {
        Node::Leaf(leaf) => leaf.char_len(),
        Node::Element(_) => 0,
    };
    (0..=len)
        .map(|offset| DocumentRange::collapsed(DocumentPoint::new(vec![0, index, 0], offset)))
        .collect()
}
