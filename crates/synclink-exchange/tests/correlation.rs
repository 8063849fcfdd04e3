//! Integration tests for the correlator over in-memory talker pairs.
//!
//! Each test wires two correlators back to back and pumps frames by
//! hand, which keeps the timing of every receive explicit.

use std::sync::Arc;
use std::time::Duration;

use synclink_exchange::{
    ExchangeError, IncomingContext, PacketCorrelator, Reaction,
};
use synclink_protocol::{
    OkPacket, Packet, PacketKind, PacketRegistry, UserData,
};
use synclink_protocol::CloseCode;
use synclink_transport::{
    CloseFrame, MemoryTalker, Talker, TalkerId, TransportError,
};

fn pair() -> (PacketCorrelator<MemoryTalker>, PacketCorrelator<MemoryTalker>) {
    let registry = Arc::new(PacketRegistry::standard());
    let (left, right) = MemoryTalker::pair();
    (
        PacketCorrelator::new(Arc::new(left), Arc::clone(&registry)),
        PacketCorrelator::new(Arc::new(right), registry),
    )
}

/// Wraps a [`MemoryTalker`] so every send stalls after forwarding,
/// like a WebSocket sink with a slow flush.
struct SlowSendTalker {
    inner: MemoryTalker,
    delay: Duration,
}

impl Talker for SlowSendTalker {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        self.inner.send(data).await?;
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        self.inner.recv().await
    }

    async fn close(
        &self,
        code: CloseCode,
        reason: &str,
    ) -> Result<(), TransportError> {
        self.inner.close(code, reason).await
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn peer_close(&self) -> Option<CloseFrame> {
        self.inner.peer_close()
    }

    fn id(&self) -> TalkerId {
        self.inner.id()
    }
}

fn ok_packet(message: &str) -> Packet {
    Packet::Ok(OkPacket {
        message: message.into(),
    })
}

/// Reads one frame off the correlator's talker and feeds it through.
async fn pump(
    correlator: &PacketCorrelator<MemoryTalker>,
) -> Option<IncomingContext> {
    let bytes = correlator
        .talker()
        .recv()
        .await
        .expect("talker recv")
        .expect("talker open");
    correlator.process_receiving(&bytes).expect("process frame")
}

#[tokio::test]
async fn request_is_answered_and_settled() {
    let (requester, responder) = pair();

    let transmission = requester
        .send(
            ok_packet("test"),
            Reaction::<String>::builder()
                .on(PacketKind::Ok, |packet| match packet {
                    Packet::Ok(ok) => Ok(ok.message),
                    other => Err(ExchangeError::Handler(format!(
                        "unexpected {:?}",
                        other.kind()
                    ))),
                })
                .build(),
        )
        .await
        .expect("send");

    let request = pump(&responder).await.expect("unsolicited request");
    assert_eq!(request.sequence, transmission.sequence());
    responder
        .respond(request.sequence, ok_packet("yes!"), Reaction::<()>::none())
        .await
        .expect("respond");

    assert!(pump(&requester).await.is_none(), "reply must settle, not surface");
    assert_eq!(transmission.await_result().await.expect("result"), "yes!");
    assert_eq!(requester.outstanding(), 0);
}

#[tokio::test]
async fn only_the_reply_sequence_settles() {
    let (requester, responder) = pair();

    let transmission = requester
        .send(
            ok_packet("ping"),
            Reaction::<()>::builder()
                .on(PacketKind::Ok, |_| Ok(()))
                .build(),
        )
        .await
        .expect("send");
    let sequence = transmission.sequence();
    assert_eq!(transmission.reply_sequence(), Some(sequence.wrapping_add(1)));

    let request = pump(&responder).await.expect("unsolicited request");

    // A frame two past the request sequence is independent traffic.
    let stray = ok_packet("stray")
        .encode(responder.registry(), sequence.wrapping_add(2))
        .expect("encode");
    responder.talker().send(&stray).await.expect("send stray");
    let surfaced = pump(&requester).await.expect("stray must surface");
    assert_eq!(surfaced.sequence, sequence.wrapping_add(2));
    assert_eq!(requester.outstanding(), 1);

    responder
        .respond(request.sequence, ok_packet("pong"), Reaction::<()>::none())
        .await
        .expect("respond");
    assert!(pump(&requester).await.is_none());
    transmission.await_result().await.expect("settled");
}

#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out() {
    let (requester, _responder) = pair();

    let transmission = requester
        .send(
            ok_packet("anyone there?"),
            Reaction::<()>::builder()
                .on(PacketKind::Ok, |_| Ok(()))
                .give_up_after(Duration::from_millis(50))
                .build(),
        )
        .await
        .expect("send");
    assert_eq!(requester.outstanding(), 1);

    match transmission.await_result().await {
        Err(ExchangeError::Timeout(elapsed)) => {
            assert_eq!(elapsed, Duration::from_millis(50));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(requester.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn timeout_handler_substitutes_a_value() {
    let (requester, _responder) = pair();

    let transmission = requester
        .send(
            ok_packet("slow query"),
            Reaction::<&'static str>::builder()
                .on(PacketKind::Ok, |_| Ok("answered"))
                .timeout(Duration::from_millis(25), |_| Ok("defaulted"))
                .build(),
        )
        .await
        .expect("send");

    assert_eq!(transmission.await_result().await.expect("result"), "defaulted");
}

#[tokio::test(start_paused = true)]
async fn late_reply_surfaces_as_unsolicited() {
    let (requester, responder) = pair();

    let transmission = requester
        .send(
            ok_packet("hurry"),
            Reaction::<()>::builder()
                .on(PacketKind::Ok, |_| Ok(()))
                .give_up_after(Duration::from_millis(30))
                .build(),
        )
        .await
        .expect("send");

    let request = pump(&responder).await.expect("unsolicited request");
    assert!(matches!(
        transmission.await_result().await,
        Err(ExchangeError::Timeout(_))
    ));

    // The answer shows up after the entry is gone.
    responder
        .respond(request.sequence, ok_packet("too late"), Reaction::<()>::none())
        .await
        .expect("respond");
    let surfaced = pump(&requester).await.expect("late reply surfaces");
    assert_eq!(surfaced.sequence, request.sequence.wrapping_add(1));
}

#[tokio::test]
async fn wildcard_handler_consumes_any_reply() {
    let (requester, responder) = pair();

    let transmission = requester
        .send(
            ok_packet("whatever you have"),
            Reaction::<PacketKind>::builder()
                .any(|packet| Ok(packet.kind()))
                .build(),
        )
        .await
        .expect("send");

    let request = pump(&responder).await.expect("request");
    let reply = Packet::UserData(UserData {
        scope: "guild:1".into(),
        holder: "player:9".into(),
        data: Default::default(),
    });
    responder
        .respond(request.sequence, reply, Reaction::<()>::none())
        .await
        .expect("respond");

    assert!(pump(&requester).await.is_none());
    assert_eq!(
        transmission.await_result().await.expect("result"),
        PacketKind::UserData
    );
}

#[tokio::test]
async fn handler_failure_reaches_the_error_handler() {
    let (requester, responder) = pair();

    let transmission = requester
        .send(
            ok_packet("strict"),
            Reaction::<String>::builder()
                .on(PacketKind::Ok, |_| {
                    Err(ExchangeError::Handler("not good enough".into()))
                })
                .on_error(|err| Ok(format!("salvaged: {err}")))
                .build(),
        )
        .await
        .expect("send");

    let request = pump(&responder).await.expect("request");
    responder
        .respond(request.sequence, ok_packet("meh"), Reaction::<()>::none())
        .await
        .expect("respond");

    assert!(pump(&requester).await.is_none());
    assert_eq!(
        transmission.await_result().await.expect("salvaged"),
        "salvaged: reaction handler failed: not good enough"
    );
}

#[tokio::test]
async fn detach_cancels_everything_outstanding() {
    let (requester, _responder) = pair();

    let transmission = requester
        .send(
            ok_packet("doomed"),
            Reaction::<()>::builder()
                .on(PacketKind::Ok, |_| Ok(()))
                .build(),
        )
        .await
        .expect("send");
    assert_eq!(requester.outstanding(), 1);

    requester.detach();
    assert_eq!(requester.outstanding(), 0);
    assert!(matches!(
        transmission.await_result().await,
        Err(ExchangeError::Cancelled)
    ));

    // New transmissions are refused once detached.
    let refused = requester
        .send(ok_packet("after the fact"), Reaction::<()>::none())
        .await;
    assert!(matches!(refused, Err(ExchangeError::Cancelled)));
}

#[tokio::test]
async fn fire_and_forget_is_never_tracked() {
    let (requester, responder) = pair();

    let transmission = requester
        .send(ok_packet("no strings attached"), Reaction::<()>::none())
        .await
        .expect("send");
    assert_eq!(requester.outstanding(), 0);
    assert!(transmission.reply_sequence().is_none());

    // The frame still travels.
    let surfaced = pump(&responder).await.expect("frame arrives");
    assert_eq!(surfaced.sequence, transmission.sequence());

    assert!(matches!(
        transmission.await_result().await,
        Err(ExchangeError::Abandoned)
    ));
}

#[tokio::test]
async fn reply_of_unexpected_kind_abandons() {
    let (requester, responder) = pair();

    let transmission = requester
        .send(
            ok_packet("expecting data"),
            Reaction::<()>::builder()
                .on(PacketKind::UserData, |_| Ok(()))
                .build(),
        )
        .await
        .expect("send");

    let request = pump(&responder).await.expect("request");
    responder
        .respond(request.sequence, ok_packet("wrong kind"), Reaction::<()>::none())
        .await
        .expect("respond");

    // The entry is consumed either way; the caller just gets nothing.
    assert!(pump(&requester).await.is_none());
    assert_eq!(requester.outstanding(), 0);
    assert!(matches!(
        transmission.await_result().await,
        Err(ExchangeError::Abandoned)
    ));
}

#[tokio::test]
async fn reply_during_slow_send_leaves_no_stale_timer() {
    let registry = Arc::new(PacketRegistry::standard());
    let (left, right) = MemoryTalker::pair();
    let requester = PacketCorrelator::new(
        Arc::new(SlowSendTalker {
            inner: left,
            delay: Duration::from_millis(50),
        }),
        Arc::clone(&registry),
    );
    let responder = PacketCorrelator::new(Arc::new(right), registry);

    // Keep the requester's receive side running so a reply can settle
    // while its own send is still flushing.
    let requester_pump = tokio::spawn({
        let requester = requester.clone();
        async move {
            while let Ok(Some(bytes)) = requester.talker().recv().await {
                let _ = requester.process_receiving(&bytes);
            }
        }
    });
    // Answer the first request the moment it arrives.
    let responder_task = tokio::spawn({
        let responder = responder.clone();
        async move {
            let request = pump(&responder).await.expect("first request");
            responder
                .respond(
                    request.sequence,
                    ok_packet("instant"),
                    Reaction::<()>::none(),
                )
                .await
                .expect("respond");
        }
    });

    // The reply lands before the 50ms send flush finishes, so this
    // transmission is settled by the time `send` returns.
    let first = requester
        .send(
            ok_packet("query"),
            Reaction::<String>::builder()
                .on(PacketKind::Ok, |packet| match packet {
                    Packet::Ok(ok) => Ok(ok.message),
                    other => Err(ExchangeError::Handler(format!(
                        "unexpected {:?}",
                        other.kind()
                    ))),
                })
                .give_up_after(Duration::from_millis(200))
                .build(),
        )
        .await
        .expect("send");
    responder_task.await.expect("responder task");
    let first_sequence = first.sequence();
    assert_eq!(first.await_result().await.expect("result"), "instant");
    assert_eq!(requester.outstanding(), 0);

    // Reuse the freed reply slot for an unrelated transmission.
    let second = requester
        .respond(
            first_sequence.wrapping_sub(1),
            ok_packet("tenant"),
            Reaction::<String>::builder()
                .on(PacketKind::Ok, |packet| match packet {
                    Packet::Ok(ok) => Ok(ok.message),
                    other => Err(ExchangeError::Handler(format!(
                        "unexpected {:?}",
                        other.kind()
                    ))),
                })
                .build(),
        )
        .await
        .expect("respond");
    assert_eq!(second.reply_sequence(), Some(first_sequence.wrapping_add(1)));

    // Outlive the first transmission's 200ms timeout. A leftover timer
    // from it would evict the slot's new tenant.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(requester.outstanding(), 1, "second transmission evicted");

    // The tenant still settles normally.
    let request = pump(&responder).await.expect("second request");
    responder
        .respond(request.sequence, ok_packet("survivor"), Reaction::<()>::none())
        .await
        .expect("respond");
    assert_eq!(second.await_result().await.expect("result"), "survivor");

    requester_pump.abort();
}
