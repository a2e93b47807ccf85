use jobplan::dispatch::{dispatch_part, priority_channels, run_workers, TransferWork};
use jobplan::resume::{
    pending_transfers, resume_directory, resume_part, unix_seconds, LocalSourceProbe,
};
use jobplan_core_plan::layout::header;
use jobplan_core_plan::{
    ChannelId, JobId, JobPartPlan, JobStatus, PlanBuilder, PlanStore, Priority, TransferSpec,
    TransferStatus,
};
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

fn builder_with(job_id: JobId, part_num: u32, priority: Priority, count: u32) -> PlanBuilder {
    let mut builder = PlanBuilder::new(job_id, part_num).priority(priority);
    for i in 0..count {
        builder
            .add_transfer(TransferSpec::new(
                format!("/src/{part_num}/{i}"),
                format!("/dst/{part_num}/{i}"),
                100,
                0,
            ))
            .unwrap();
    }
    builder
}

#[test]
fn test_dispatch_orders_parts_by_priority() {
    let temp_dir = TempDir::new().unwrap();
    let store = PlanStore::new(temp_dir.path()).unwrap();
    let job = JobId::new();

    let low = store
        .create_part(&builder_with(job, 0, Priority::Low, 3))
        .unwrap();
    let high = store
        .create_part(&builder_with(job, 1, Priority::High, 2))
        .unwrap();
    let medium = store
        .create_part(&builder_with(job, 2, Priority::Medium, 2))
        .unwrap();

    let (tx, rx) = priority_channels(0);
    assert_eq!(dispatch_part(&low, &tx).unwrap(), 3);
    assert_eq!(dispatch_part(&high, &tx).unwrap(), 2);
    assert_eq!(dispatch_part(&medium, &tx).unwrap(), 2);
    drop(tx);

    let received: Vec<(ChannelId, TransferWork)> = rx.iter().collect();
    let parts: Vec<u32> = received.iter().map(|(_, w)| w.part_num).collect();
    assert_eq!(parts, vec![1, 1, 2, 2, 0, 0, 0]);
    assert_eq!(received[0].0, ChannelId::High);
    assert_eq!(received[6].0, ChannelId::Low);
    // Transfer order inside a part is preserved
    let low_indices: Vec<u32> = received[4..].iter().map(|(_, w)| w.transfer_index).collect();
    assert_eq!(low_indices, vec![0, 1, 2]);
}

#[test]
fn test_only_unfinished_transfers_dispatched() {
    let plan = JobPartPlan::from_bytes(
        &builder_with(JobId::new(), 0, Priority::High, 4)
            .build()
            .unwrap(),
    )
    .unwrap();
    plan.transfer(1).unwrap().complete(10).unwrap();
    plan.transfer(3).unwrap().fail(11).unwrap();

    let (tx, rx) = priority_channels(0);
    dispatch_part(&plan, &tx).unwrap();
    drop(tx);
    let indices: Vec<u32> = rx.iter().map(|(_, w)| w.transfer_index).collect();
    assert_eq!(indices, vec![0, 2]);
}

#[test]
fn test_paused_part_waits_for_resume() {
    let plan = JobPartPlan::from_bytes(
        &builder_with(JobId::new(), 0, Priority::Medium, 2)
            .build()
            .unwrap(),
    )
    .unwrap();
    plan.pause().unwrap();

    let (tx, rx) = priority_channels(0);
    assert_eq!(dispatch_part(&plan, &tx).unwrap(), 0);
    assert!(rx.is_empty());

    let report = resume_part(&plan, None, 0).unwrap();
    assert_eq!(report.pending, 2);
    assert_eq!(dispatch_part(&plan, &tx).unwrap(), 2);
    assert_eq!(rx.len(ChannelId::Medium), 2);
}

#[test]
fn test_workers_complete_parts_and_observe_cancel() {
    let job = JobId::new();
    let running =
        JobPartPlan::from_bytes(&builder_with(job, 0, Priority::High, 20).build().unwrap())
            .unwrap();
    let cancelled =
        JobPartPlan::from_bytes(&builder_with(job, 1, Priority::Low, 20).build().unwrap())
            .unwrap();
    let plans: HashMap<u32, &JobPartPlan> = HashMap::from([(0, &running), (1, &cancelled)]);

    let (tx, rx) = priority_channels(8);
    let stats = std::thread::scope(|s| {
        let producer = {
            let tx = tx.clone();
            let running = &running;
            let cancelled = &cancelled;
            s.spawn(move || {
                dispatch_part(running, &tx).unwrap();
                dispatch_part(cancelled, &tx).unwrap();
            })
        };
        drop(tx);
        // Cancel before any worker reaches the low-priority part
        cancelled.cancel().unwrap();

        let stats = run_workers(&rx, 4, |_, work| {
            let plan = plans[&work.part_num];
            if plan.job_status().load()? != JobStatus::InProgress {
                return Ok(());
            }
            plan.transfer(work.transfer_index)?.complete(1_000)?;
            Ok(())
        })
        .unwrap();
        producer.join().unwrap();
        stats
    });

    assert_eq!(stats.failed, 0);
    assert!(running.all_transfers_terminal());
    running.complete().unwrap();
    assert_eq!(running.job_status().load().unwrap(), JobStatus::Completed);

    assert_eq!(cancelled.job_status().load().unwrap(), JobStatus::Cancelled);
    assert_eq!(cancelled.progress().in_progress, 20);
}

#[test]
fn test_resume_directory_reports_bad_files() {
    let temp_dir = TempDir::new().unwrap();
    let store = PlanStore::new(temp_dir.path()).unwrap();
    let job = JobId::new();

    let paused = store
        .create_part(&builder_with(job, 0, Priority::High, 2))
        .unwrap();
    paused.pause().unwrap();
    paused.flush().unwrap();
    drop(paused);

    let done = store
        .create_part(&builder_with(job, 1, Priority::High, 1))
        .unwrap();
    done.transfer(0).unwrap().complete(5).unwrap();
    done.complete().unwrap();
    done.flush().unwrap();
    drop(done);

    // Part 2 claims a schema version this build does not know
    let mut foreign = builder_with(job, 2, Priority::Low, 1).build().unwrap();
    foreign[header::VERSION..header::VERSION + 4].copy_from_slice(&7u32.to_le_bytes());
    fs::write(store.path_for(job, 2), &foreign).unwrap();

    // Part 3 is truncated inside its string pool
    let mut truncated = builder_with(job, 3, Priority::Low, 1).build().unwrap();
    truncated.truncate(truncated.len() - 3);
    fs::write(store.path_for(job, 3), &truncated).unwrap();

    let summary = resume_directory(&store, None, 100).unwrap();
    assert_eq!(summary.reports.len(), 2);
    assert_eq!(summary.failures.len(), 2);
    assert!(summary.failures.iter().all(|f| f.integrity));
    assert_eq!(summary.pending(), 2);

    let resumed = summary.reports.iter().find(|r| r.part_num == 0).unwrap();
    assert!(resumed.resumable);
    assert_eq!(resumed.previous_status, "Paused");
    let finished = summary.reports.iter().find(|r| r.part_num == 1).unwrap();
    assert!(!finished.resumable);

    // Bad files are left byte-for-byte untouched
    assert_eq!(fs::read(store.path_for(job, 2)).unwrap(), foreign);
    assert_eq!(fs::read(store.path_for(job, 3)).unwrap(), truncated);

    let reopened = store.open_part(job, 0).unwrap();
    assert_eq!(reopened.job_status().load().unwrap(), JobStatus::InProgress);
}

#[test]
fn test_local_probe_fails_changed_sources() {
    let temp_dir = TempDir::new().unwrap();
    let unchanged = temp_dir.path().join("unchanged.bin");
    let changed = temp_dir.path().join("changed.bin");
    fs::write(&unchanged, vec![1u8; 64]).unwrap();
    fs::write(&changed, vec![1u8; 64]).unwrap();

    let mtime = |path: &std::path::Path| {
        unix_seconds(fs::metadata(path).unwrap().modified().unwrap().into())
    };

    let mut builder = PlanBuilder::new(JobId::new(), 0);
    for path in [&unchanged, &changed] {
        builder
            .add_transfer(TransferSpec::new(
                path.to_str().unwrap(),
                "/dst/out.bin",
                64,
                mtime(path),
            ))
            .unwrap();
    }
    let plan = builder.create(temp_dir.path().join("part.steV0")).unwrap();

    fs::write(&changed, vec![2u8; 128]).unwrap();

    let report = resume_part(&plan, Some(&LocalSourceProbe), 500).unwrap();
    assert_eq!(report.pending, 1);
    assert_eq!(report.invalidated, 1);
    assert_eq!(pending_transfers(&plan), vec![0]);
    assert_eq!(
        plan.transfer(1).unwrap().status().load().unwrap(),
        TransferStatus::Failed
    );
}
