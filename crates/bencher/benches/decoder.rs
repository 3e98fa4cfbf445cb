use std::hint::black_box;
use bencher::{TestCase, TestFile};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use micro_httpapi::codec::RequestDecoder;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::Decoder;

static SMALL_HEADER: TestFile = TestFile::new("get_small", bencher::GET_SMALL);
static LARGE_HEADER: TestFile = TestFile::new("get_large", bencher::GET_LARGE);
static POST_BODY: TestFile = TestFile::new("post_body", bencher::POST_BODY);

fn create_test_cases() -> Vec<TestCase> {
    vec![
        TestCase::small("small_header_decoder", SMALL_HEADER),
        TestCase::normal("large_header_decoder", LARGE_HEADER),
        TestCase::normal("post_body_decoder", POST_BODY),
    ]
}

fn benchmark_request_decoder(criterion: &mut Criterion) {
    let test_cases = create_test_cases();
    let mut group = criterion.benchmark_group("request_decoder");

    for case in test_cases {
        group.throughput(Throughput::Bytes(case.file().content().len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &case, |b, case| {
            let mut request_decoder = RequestDecoder::new();
            b.iter_batched_ref(
                || BytesMut::from(case.file().content()),
                |bytes_mut| {
                    // head, then body chunks until end of body
                    while let Some(message) = request_decoder.decode(bytes_mut).expect("input should be a valid http request") {
                        let eof = message.is_payload() && message.into_payload_item().is_some_and(|item| item.is_eof());
                        if eof {
                            break;
                        }
                    }
                    black_box(bytes_mut.len());
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(decoder, benchmark_request_decoder);
criterion_main!(decoder);
