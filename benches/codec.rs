use bytes::BytesMut;
use criterion::*;
use media_transport::feedback::RtcpFeedbackPacket;
use media_transport::sdes::{CryptoAttribute, CryptoSuite};
use media_transport::FeedbackEvent;

fn criterion_benchmark(c: &mut Criterion) {
    let pli = RtcpFeedbackPacket::pli(0x1122_3344, 0xAABB_CCDD).to_bytes();
    let attribute = CryptoAttribute::generate(1, CryptoSuite::AesCm128HmacSha1_80).encode();

    {
        let mut rtcp = c.benchmark_group("rtcp");

        rtcp.throughput(Throughput::Elements(1));

        rtcp.bench_function("feedback_event_from_packet", |b| {
            b.iter(|| {
                FeedbackEvent::from_packet(black_box(&pli)).unwrap();
            })
        });

        rtcp.bench_function("unmarshal_pli", |b| {
            b.iter(|| {
                RtcpFeedbackPacket::unmarshal(black_box(&pli)).unwrap();
            })
        });

        let packet = RtcpFeedbackPacket::pli(0x1122_3344, 0xAABB_CCDD);
        let mut buf = BytesMut::with_capacity(64);
        rtcp.bench_function("marshal_pli", |b| {
            b.iter(|| {
                buf.clear();
                packet.marshal_to(&mut buf);
            })
        });

        rtcp.finish();
    }

    {
        let mut sdes = c.benchmark_group("sdes");

        sdes.throughput(Throughput::Elements(1));

        sdes.bench_function("decode_crypto_attribute", |b| {
            b.iter(|| {
                CryptoAttribute::decode(black_box(&attribute)).unwrap();
            })
        });

        sdes.bench_function("generate_crypto_attribute", |b| {
            b.iter(|| CryptoAttribute::generate(1, CryptoSuite::AesCm128HmacSha1_80).encode())
        });

        sdes.finish();
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
