use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use jobplan::dispatch::{dispatch_part, priority_channels};
use jobplan_core_plan::{JobId, JobPartPlan, PlanBuilder, TransferSpec, TransferStatus};
use std::hint::black_box;

const TRANSFERS: u32 = 10_000;

fn build_plan() -> JobPartPlan {
    let mut builder = PlanBuilder::new(JobId::new(), 0);
    for i in 0..TRANSFERS {
        builder
            .add_transfer(TransferSpec::new(
                format!("/data/src/file-{i:05}.bin"),
                format!("/data/dst/file-{i:05}.bin"),
                64 * 1024,
                1_700_000_000,
            ))
            .expect("transfer");
    }
    JobPartPlan::from_bytes(&builder.build().expect("plan")).expect("open")
}

fn benchmark_status_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("status_throughput");
    group.throughput(Throughput::Elements(TRANSFERS as u64));

    group.bench_function("open_and_validate", |b| {
        let mut builder = PlanBuilder::new(JobId::new(), 0);
        for i in 0..TRANSFERS {
            builder
                .add_transfer(TransferSpec::new(format!("s{i}"), format!("d{i}"), 1, 0))
                .expect("transfer");
        }
        let bytes = builder.build().expect("plan");
        b.iter(|| black_box(JobPartPlan::from_bytes(black_box(&bytes)).expect("open")));
    });

    group.bench_function("store_every_status", |b| {
        let plan = build_plan();
        b.iter(|| {
            for view in plan.transfers() {
                view.status().store(black_box(TransferStatus::InProgress));
            }
        });
    });

    group.bench_function("dispatch_part", |b| {
        let plan = build_plan();
        b.iter(|| {
            let (tx, rx) = priority_channels(0);
            let sent = dispatch_part(&plan, &tx).expect("dispatch");
            drop(tx);
            black_box((sent, rx.iter().count()))
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_status_access);
criterion_main!(benches);
