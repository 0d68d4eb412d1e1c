use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use protowire::varint::{decode_varint, encode_varint, encoded_varint_len};

// One representative value per encoded length.
fn widths() -> Vec<u64> {
    vec![
        1,
        0x0000_0000_0000_0080,
        0x0000_0000_0000_8000,
        0x0000_0000_0080_0000,
        0x0000_0000_8000_0000,
        0x0000_0080_0000_0000,
        0x0000_8000_0000_0000,
        0x0080_0000_0000_0000,
        0x8000_0000_0000_0000,
    ]
}

fn varint_decode(c: &mut Criterion) {
    let encoded: Vec<(Vec<u8>, usize)> = widths()
        .into_iter()
        .map(|value| {
            let mut buf = Vec::new();
            let len = encode_varint(value, &mut buf);
            (buf, len)
        })
        .collect();

    let mut group = c.benchmark_group("varint_decode");
    for (data, len) in &encoded {
        group.bench_with_input(BenchmarkId::from_parameter(len), &data, |b, data| {
            b.iter(|| {
                let value = decode_varint(data).unwrap();
                std::hint::black_box(value)
            })
        });
    }
    group.finish();
}

fn varint_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("varint_encode");
    for value in widths() {
        let len = encoded_varint_len(value);
        group.bench_with_input(BenchmarkId::from_parameter(len), &value, |b, &value| {
            let mut buf = Vec::with_capacity(16);
            b.iter(|| {
                buf.clear();
                let written = encode_varint(value, &mut buf);
                std::hint::black_box(written)
            })
        });
    }
    group.finish();
}

fn varint_decode_stream(c: &mut Criterion) {
    // A contiguous run of mixed-width varints, decoded back to back.
    let values: Vec<u64> = (0..1024u64).map(|i| i.wrapping_mul(0x9e37_79b9_7f4a_7c15)).collect();
    let mut stream = Vec::new();
    for &value in &values {
        encode_varint(value, &mut stream);
    }

    let mut group = c.benchmark_group("varint_decode_stream");
    group.bench_with_input(
        BenchmarkId::from_parameter(values.len()),
        &stream,
        |b, stream| {
            b.iter(|| {
                let mut pos = 0;
                while pos < stream.len() {
                    let (value, read) = decode_varint(&stream[pos..]).unwrap();
                    std::hint::black_box(value);
                    pos += read;
                }
            })
        },
    );
    group.finish();
}

criterion_group!(varint, varint_decode, varint_encode, varint_decode_stream);
criterion_main!(varint);
