use micro_tracker::{
    config::AppConfig,
    db,
    models::{image::NewImage, job::JobState, result::BoundingBox},
    queue::JobQueueCoordinator,
    store::StoreError,
    worker::ComputeWorkerChannel,
};

/// Integration test: durable queue flow against PostgreSQL
///
/// This test verifies:
/// 1. Database connection and schema
/// 2. Image, job and result repositories
/// 3. Recovery of a job left running by a previous session
/// 4. Deletion of a job together with its result
///
/// Note: This requires a running PostgreSQL instance configured via
/// DATABASE_URL.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_durable_queue_flow() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let database_url = config.database_url.expect("DATABASE_URL must be set");

    let pool = db::init_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    let stores = db::stores(pool);

    // 1. Store an image
    let image = stores
        .images
        .create(NewImage {
            name: "integration-slide".to_string(),
            patient: "anon".to_string(),
            width: 2,
            height: 2,
            file_type: "image/png".to_string(),
            data: vec![1, 2, 3, 4],
        })
        .await
        .expect("Failed to store image");
    assert_eq!(stores.images.read(image.id).await.unwrap().data, vec![1, 2, 3, 4]);

    // 2. Schedule through a first coordinator session
    let (channel, _events, mut worker) = ComputeWorkerChannel::pair();
    let mut session = JobQueueCoordinator::new(stores.clone(), channel);
    session.initialize().await;
    session.on_worker_ready().await;
    let job = session.schedule(image.id).await.expect("Failed to schedule");
    assert_eq!(job.state, JobState::Waiting);

    worker.try_recv().expect("job dispatched");
    session.on_worker_started(job.id).await;
    assert_eq!(stores.jobs.read(job.id).await.unwrap().state, JobState::Running);
    drop(session);

    // 3. A new session re-dispatches the running job
    let (channel, _events, mut worker) = ComputeWorkerChannel::pair();
    let mut session = JobQueueCoordinator::new(stores.clone(), channel);
    session.initialize().await;
    session.on_worker_ready().await;
    let micro_tracker::messages::WorkerCommand::ScheduleJob { job_id, image: bytes } =
        worker.try_recv().expect("running job re-dispatched");
    assert_eq!(job_id, job.id);
    assert_eq!(bytes, vec![1, 2, 3, 4]);

    let boxes = vec![BoundingBox { x: 1.0, y: 2.0, w: 3.0, h: 4.0 }];
    session.on_worker_result(job.id, vec![9], boxes.clone()).await;

    let finished = stores.jobs.read(job.id).await.unwrap();
    assert_eq!(finished.state, JobState::Finished);
    let result_id = finished.result.expect("result linked");
    let record = stores.results.read(result_id).await.unwrap();
    assert_eq!(record.detections, boxes);
    assert_eq!(record.job_id, job.id);

    // 4. Delete the job and its result
    session.delete(job.id).await.expect("Failed to delete job");
    assert!(matches!(
        stores.jobs.read(job.id).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        stores.results.read(result_id).await,
        Err(StoreError::NotFound(_))
    ));

    stores.images.delete(image.id).await.unwrap();
}
