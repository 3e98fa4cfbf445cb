use std::hint::black_box;
use std::net::SocketAddr;
use bencher::{TestCase, TestFile};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use micro_httpapi::codec::{record_size, RecordEncoder, RequestDecoder, RequestRecord};
use micro_httpapi::protocol::{
    ConnectionId, CookedUrl, Message, ReceivedRequest, RequestFlags, RequestHeaderId, RequestId,
};
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

static SMALL_HEADER: TestFile = TestFile::new("get_small", bencher::GET_SMALL);
static LARGE_HEADER: TestFile = TestFile::new("get_large", bencher::GET_LARGE);

fn create_test_cases() -> Vec<TestCase> {
    vec![TestCase::small("small_record", SMALL_HEADER), TestCase::normal("large_record", LARGE_HEADER)]
}

fn parse(content: &str) -> ReceivedRequest {
    let local_addr: SocketAddr = "127.0.0.1:8080".parse().expect("valid address");
    let remote_addr: SocketAddr = "127.0.0.1:50000".parse().expect("valid address");

    let mut bytes = BytesMut::from(content);
    let Some(Message::Header(head)) = RequestDecoder::new().decode(&mut bytes).expect("valid request") else {
        panic!("input should start with a request head");
    };
    let host = head.headers().get(RequestHeaderId::Host).and_then(|h| std::str::from_utf8(h).ok());
    let cooked_url = CookedUrl::from_target(head.raw_url(), host, local_addr).expect("valid url");

    ReceivedRequest {
        connection_id: ConnectionId(1),
        request_id: RequestId(1),
        url_context: 0,
        version: head.version(),
        verb: head.verb(),
        unknown_verb: head.unknown_verb().cloned(),
        raw_url: head.raw_url().to_string(),
        cooked_url,
        headers: head.headers().clone(),
        remote_addr,
        local_addr,
        head_len: head.head_len(),
        payload_size: head.payload_size(),
    }
}

fn benchmark_record_encoder(criterion: &mut Criterion) {
    let test_cases = create_test_cases();
    let mut group = criterion.benchmark_group("record_encoder");

    for case in test_cases {
        let request = parse(case.file().content());
        group.throughput(Throughput::Bytes(record_size(&request) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &request, |b, request| {
            let mut encoder = RecordEncoder;
            b.iter_batched_ref(
                || BytesMut::with_capacity(4096),
                |dst| {
                    let record = RequestRecord::complete(request, RequestFlags::NONE, request.head_len as u64, None);
                    encoder.encode(record, dst).expect("record should encode");
                    black_box(dst.len());
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(record, benchmark_record_encoder);
criterion_main!(record);
