use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stm_core::decay::{calculate_decay_lambda, calculate_score, time_until_threshold, DecayModel};

fn bench_calculate_score(c: &mut Criterion) {
    let model = DecayModel::Exponential {
        beta: 0.6,
        lambda: calculate_decay_lambda(3.0),
    };

    c.bench_function("calculate_score/exponential", |b| {
        b.iter(|| calculate_score(black_box(5), black_box(0), black_box(1.0), black_box(86_400), model))
    });
}

fn bench_time_until_threshold_numeric(c: &mut Criterion) {
    let tau = 3.0 * 86_400.0;
    let model = DecayModel::PowerLaw { beta: 0.6, tau, alpha: 1.5 };

    c.bench_function("time_until_threshold/power_law_numeric", |b| {
        b.iter(|| time_until_threshold(black_box(5), black_box(0), black_box(1.0), black_box(0.05), black_box(0), model))
    });
}

criterion_group!(benches, bench_calculate_score, bench_time_until_threshold_numeric);
criterion_main!(benches);
