use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode, Throughput};
use tbpe::config::PretokenizeConfig;
use tbpe::pretokenize::pretokenize_texts;
use tbpe::{RegexSegmenter, Trainer, TrainerConfig};

const WORDS: &[&str] = &[
    "the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog", "tokenizer", "training",
    "merges", "frequent", "pairs", "vocabulary", "byte", "level",
];

fn build_documents() -> Vec<String> {
    let mut documents = Vec::with_capacity(256);
    for doc in 0..256usize {
        let mut text = String::with_capacity(4096);
        for idx in 0..600usize {
            let word = WORDS[(doc * 7 + idx * 13 + idx / 5) % WORDS.len()];
            if idx > 0 {
                text.push(' ');
            }
            text.push_str(word);
            if idx % 17 == 0 {
                text.push_str(&format!(" {}", idx * doc));
            }
        }
        documents.push(text);
    }
    documents
}

fn bench_training(c: &mut Criterion) {
    let documents = build_documents();
    let total_bytes: usize = documents.iter().map(String::len).sum();
    let cfg = TrainerConfig::builder()
        .target_vocab_size(1024)
        .show_progress(false)
        .build()
        .expect("configuration");
    let pretokenize = PretokenizeConfig::default();
    let segmenter = RegexSegmenter::from_config(&pretokenize).expect("segmenter");
    let counts = pretokenize_texts(&documents, &segmenter).expect("word counts");

    let mut group = c.benchmark_group("train_text_corpus");
    group.throughput(Throughput::Bytes(total_bytes as u64));
    group.sampling_mode(SamplingMode::Flat);
    group.bench_function(BenchmarkId::new("pretokenize", documents.len()), |b| {
        b.iter(|| black_box(pretokenize_texts(&documents, &segmenter).expect("pretokenize")));
    });
    group.bench_function(BenchmarkId::new("merges", cfg.num_merges()), |b| {
        b.iter(|| {
            let trainer = Trainer::new(cfg.clone());
            let artefacts = trainer.train_from_word_counts(&counts).expect("training");
            let _ = black_box(artefacts);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_training);
criterion_main!(benches);
