//! Scripted end-to-end replay of a chat session: an out-of-order
//! reasoning stream, a rephrase, and a regeneration, all against the
//! in-process transport and store.
//!
//! Run with `cargo run -p engine --example replay`.

use std::sync::mpsc::channel;
use std::sync::Arc;

use async_trait::async_trait;

use engine::rephrase::{BufferView, DocRange, SelectionSnapshot};
use engine::session::ChatSession;
use shared::capabilities::StaticCapabilities;
use shared::message::{FileAttachment, Message};
use shared::notice::NoticeSink;
use shared::store::{RewriteAction, RewriteKind};
use shared::stream::TransportStatus;
use shared::transport::ChatTransport;
use storage::memory::MemoryMessageStore;
use transport::decoder::ReasoningFrameDecoder;
use transport::local::LocalChatTransport;
use transport::source::ReasoningEventSource;

struct CannedRewrite;

#[async_trait]
impl RewriteAction for CannedRewrite {
    async fn rewrite(
        &self,
        _kind: RewriteKind,
        text: &str,
        _target_language: Option<&str>,
    ) -> anyhow::Result<Option<String>> {
        Ok(Some(format!("{text}, put another way")))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("debug").init();

    let transport = Arc::new(LocalChatTransport::new());
    let store = Arc::new(MemoryMessageStore::new());
    let (notice_tx, notice_rx) = channel();
    let session = ChatSession::new(
        transport.clone(),
        store.clone(),
        Arc::new(CannedRewrite),
        Arc::new(StaticCapabilities::new()),
        "deepseek-r1:8b",
        NoticeSink::new(notice_tx),
    );

    let source = ReasoningEventSource::new();
    session.set_reasoning_events(source.subscribe());

    // ── A question with an attachment ──────────────────────────────────
    session.send(
        "How deep is the wreck in this sonar scan?",
        vec![FileAttachment {
            id: "scan-1".into(),
            message_id: String::new(),
            file_name: "sonar.png".into(),
            media_type: "image/png".into(),
            data: Some("iVBORw0KGgo=".into()),
        }],
    )?;
    let user_id = session.messages()[0].id.clone();
    store.insert(&session.messages()[0]);

    // ── Reasoning arrives before the assistant message exists ──────────
    transport.set_status(TransportStatus::Streaming);
    let mut decoder = ReasoningFrameDecoder::new();
    let chunks: Vec<&[u8]> = vec![
        b"data: {\"type\":\"reasoning-start\"}\n\ndata: {\"type\":\"reas",
        b"oning-delta\",\"text\":\"Reading the scale bar\"}\n\n",
        b"data: {\"type\":\"reasoning-delta\",\"text\":\"Reading the scale bar, depth marks at 40m\"}\n\n",
    ];
    for chunk in chunks {
        for event in decoder.feed(chunk) {
            source.publish(event);
        }
        session.poll();
    }

    // The shell message shows up late; the buffered reasoning lands on it.
    transport.update(&mut |messages| messages.push(Message::assistant("")));
    session.poll();

    for event in decoder.feed(
        b"data: {\"type\":\"reasoning-end\",\"duration_secs\":2.4,\
          \"text\":\"Reading the scale bar, depth marks at 40m, wreck sits just below\"}\n\n",
    ) {
        source.publish(event);
    }
    transport.update(&mut |messages| {
        if let Some(last) = messages.last_mut() {
            last.content = "The wreck lies at roughly 42 meters.".to_string();
            last.sync_text_part();
        }
    });
    transport.set_status(TransportStatus::Ready);
    session.poll();

    let assistant = session.messages()[1].clone();
    store.insert(&assistant);
    println!("reasoning: {:?}", assistant.reasoning);

    // ── Rephrase a span of the answer ──────────────────────────────────
    session.rephrase().begin(
        SelectionSnapshot {
            message_id: assistant.id.clone(),
            text: "roughly 42 meters".into(),
            range: DocRange { start: 18, end: 35 },
        },
        RewriteKind::Rephrase,
        None,
    );
    session.rephrase().request().await;
    let mut view = BufferView::new(assistant.content.clone());
    session.rephrase().accept(&mut view).await;
    println!("rephrased: {}", session.messages()[1].content);

    // ── Regenerate the answer; attachment bytes come back from storage ─
    let slot_id = session.messages()[1].id.clone();
    transport.enqueue_assistant("Call it 42 meters to the deck, 45 to the seabed.");
    session.regenerate(&slot_id).await;
    println!(
        "reload carried {} attachment(s) for {}",
        transport.reload_log()[0].attachments.len(),
        user_id,
    );
    transport.deliver_next();
    session.poll();

    let regenerated = session.messages()[1].clone();
    println!(
        "attempts: {} (showing \"{}\")",
        regenerated.attempts.len(),
        regenerated.content
    );

    println!("\nfinal thread:");
    for message in session.messages() {
        println!("  [{:?}] {}", message.role, message.content);
    }
    for notice in notice_rx.try_iter() {
        println!("  notice: {:?} {}", notice.level, notice.title);
    }
    Ok(())
}
