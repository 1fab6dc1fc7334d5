use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use exif_datefix::exif_writer::ExifBlockWriter;
use exif_datefix::{
    FixedTimezone, MemoryAssetStore, MetadataExtractor, MismatchScanner, ScanConfig, TimestampCodec,
    Tolerance,
};

/// Synthetic JPEG payloads; every third one has no offset, every fifth one has subseconds
fn build_payloads(count: usize) -> Vec<Vec<u8>> {
    let base = Utc.with_ymd_and_hms(2018, 1, 1, 8, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            let captured = base + Duration::minutes(i as i64 * 17);
            let timestamp = captured.format("%Y:%m:%d %H:%M:%S").to_string();
            let offset = if i % 3 == 0 { None } else { Some("+02:00") };
            let subsec = if i % 5 == 0 { Some("250") } else { None };
            let mut writer = ExifBlockWriter::new();
            writer
                .add_ascii_tag("Make", "Bench")
                .and_then(|w| w.add_capture_time(&timestamp, offset, subsec))
                .expect("known tags");
            writer.to_jpeg_bytes()
        })
        .collect()
}

fn benchmark_codec(c: &mut Criterion) {
    let codec = TimestampCodec::with_timezone(FixedTimezone::utc());
    let mut group = c.benchmark_group("timestamp_codec");

    group.bench_function("with_offset", |b| {
        b.iter(|| codec.decode(black_box("2024:01:15 14:30:00"), black_box(Some("+09:00"))))
    });
    group.bench_function("fallback_timezone", |b| {
        b.iter(|| codec.decode(black_box("2024:01:15 14:30:00"), black_box(None)))
    });
    group.bench_function("malformed", |b| {
        b.iter(|| codec.decode(black_box("2024-01-15 14:30:00"), black_box(None)))
    });

    group.finish();
}

fn benchmark_extraction(c: &mut Criterion) {
    let payloads = build_payloads(100);
    let extractor = MetadataExtractor::with_codec(TimestampCodec::with_timezone(FixedTimezone::utc()));

    c.bench_function("extract_original_date_x100", |b| {
        b.iter(|| {
            payloads
                .iter()
                .filter_map(|p| extractor.extract_original_date(black_box(p)))
                .count()
        })
    });
}

fn benchmark_scan(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("tokio runtime");
    let mut group = c.benchmark_group("memory_store_scan");

    for size in [100usize, 1000] {
        let store = MemoryAssetStore::new();
        let recorded = Utc.with_ymd_and_hms(2018, 1, 1, 8, 0, 0).unwrap();
        for (i, payload) in build_payloads(size).into_iter().enumerate() {
            store.insert(&format!("asset-{i}"), recorded, Some(payload));
        }
        let scanner = MismatchScanner::new(
            MetadataExtractor::with_codec(TimestampCodec::with_timezone(FixedTimezone::utc())),
            ScanConfig::new(Tolerance::from_secs(2)),
        );

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                runtime
                    .block_on(scanner.scan(&store, None, |_| {}))
                    .map(|outcome| outcome.flagged.len())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_codec, benchmark_extraction, benchmark_scan);
criterion_main!(benches);
