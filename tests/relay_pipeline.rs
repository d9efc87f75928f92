//! Queue -> frame buffer -> encoder -> voice sink, driven through the public
//! API with paused time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use voice_relay_backend::audio::{AudioChunk, EncodedPacket, Frame, FRAME_BYTES};
use voice_relay_backend::codec::{AudioEncoder, CodecError, EncoderFactory};
use voice_relay_backend::ingest::{HubSettings, IngestHub};
use voice_relay_backend::orchestrator::{Orchestrator, ReconcileOutcome};
use voice_relay_backend::relay::{RelayError, RelaySettings, VoiceRelay};
use voice_relay_backend::voice::{LoopbackGateway, LoopbackSettings};

/// Packet = first sample of the frame, little endian.
struct FirstSampleEncoder;

impl AudioEncoder for FirstSampleEncoder {
    fn encode(&mut self, frame: &Frame) -> Result<EncodedPacket, CodecError> {
        Ok(EncodedPacket::new(frame.samples()[0].to_le_bytes().to_vec()))
    }

    fn set_bitrate(&mut self, _bitrate: i32) -> Result<(), CodecError> {
        Ok(())
    }
}

#[derive(Default)]
struct CountingFactory {
    created: AtomicUsize,
}

impl EncoderFactory for CountingFactory {
    fn name(&self) -> &'static str {
        "first-sample"
    }

    fn create(&self) -> Result<Box<dyn AudioEncoder>, CodecError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FirstSampleEncoder))
    }
}

fn frame_chunk(value: i16) -> AudioChunk {
    let bytes = value.to_le_bytes();
    AudioChunk::new(bytes.iter().copied().cycle().take(FRAME_BYTES).collect())
}

struct Pipeline {
    encoders: Arc<CountingFactory>,
    gateway: Arc<LoopbackGateway>,
    relay: Arc<VoiceRelay>,
    hub: Arc<IngestHub>,
    orchestrator: Orchestrator,
}

fn pipeline(queue_capacity: usize) -> Pipeline {
    let gateway = Arc::new(LoopbackGateway::new(LoopbackSettings {
        record_packets: true,
        ..Default::default()
    }));
    let encoders = Arc::new(CountingFactory::default());
    let relay = Arc::new(VoiceRelay::new(
        gateway.clone(),
        encoders.clone(),
        RelaySettings::default(),
    ));
    let hub = Arc::new(IngestHub::new(
        HubSettings {
            queue_capacity,
            idle_timeout: Duration::from_secs(10),
            expected_producer_version: "1.3.5".to_string(),
        },
        relay.subscribe_connected(),
    ));
    let orchestrator = Orchestrator::new(hub.clone(), relay.clone(), Duration::from_secs(1));

    Pipeline {
        encoders,
        gateway,
        relay,
        hub,
        orchestrator,
    }
}

fn received_values(gateway: &LoopbackGateway) -> Vec<i16> {
    gateway
        .last_session()
        .map(|record| {
            record
                .received()
                .iter()
                .map(|p| i16::from_le_bytes([p.as_bytes()[0], p.as_bytes()[1]]))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test(start_paused = true)]
async fn test_audio_flows_from_ingest_to_sink() {
    let p = pipeline(16);
    p.relay.connect("token", "guild", "channel").await.unwrap();

    // Two frames split across uneven chunks, then a third whole one
    let mut first_two: Vec<u8> = frame_chunk(1).into_bytes();
    first_two.extend(frame_chunk(2).into_bytes());
    let (a, b) = first_two.split_at(500);
    p.hub.ingest_chunk(AudioChunk::new(a.to_vec()));
    p.hub.ingest_chunk(AudioChunk::new(b.to_vec()));
    p.hub.ingest_chunk(frame_chunk(3));
    assert!(p.hub.is_streaming());

    assert_eq!(p.orchestrator.reconcile().await, ReconcileOutcome::Started);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(received_values(&p.gateway), vec![1, 2, 3]);
    let stats = p.relay.stats();
    assert_eq!(stats.frames_sent, 3);
    assert_eq!(stats.chunks_buffered, 3);

    // Producer goes quiet: liveness drops after the idle timeout
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(!p.hub.is_streaming());

    p.relay.disconnect().await.unwrap();
    let record = p.gateway.last_session().unwrap();
    assert!(!record.is_speaking());
    assert!(record.has_left());
    assert!(matches!(
        p.relay.start_streaming(p.hub.queue()).await,
        Err(RelayError::NotConnected)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_overflow_keeps_newest_audio() {
    let p = pipeline(2);
    p.relay.connect("token", "guild", "channel").await.unwrap();

    for value in [10, 20, 30] {
        p.hub.ingest_chunk(frame_chunk(value));
    }
    assert_eq!(p.hub.stats().chunks_evicted, 1);

    p.relay.start_streaming(p.hub.queue()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(received_values(&p.gateway), vec![20, 30]);
    p.relay.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_stop_uses_fresh_encoder() {
    let p = pipeline(8);
    p.relay.connect("token", "guild", "channel").await.unwrap();

    p.relay.start_streaming(p.hub.queue()).await.unwrap();
    p.relay.stop_streaming().await;
    assert!(p.relay.is_connected());
    assert!(!p.relay.is_streaming());

    p.hub.ingest_chunk(frame_chunk(7));
    assert_eq!(p.orchestrator.reconcile().await, ReconcileOutcome::Started);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(received_values(&p.gateway), vec![7]);
    // Probe + session encoder on each start
    assert_eq!(p.encoders.created.load(Ordering::SeqCst), 4);
    p.relay.shutdown().await;
    assert!(!p.relay.is_connected());
}
