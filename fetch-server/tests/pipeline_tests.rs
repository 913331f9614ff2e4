//! End-to-end pipeline tests with stand-in fetch and mux tools.

#![cfg(unix)]

mod common;

use std::time::Duration;

use fetch_server::Error;
use fetch_server::config::PipelineConfig;
use fetch_server::pipeline::{Delivery, JobPipeline, JobRequest, JobShape, JobState, WorkspaceMode};
use futures::StreamExt;
use tempfile::TempDir;

use common::{
    fake_fetch, fake_mux, leftovers, pipeline_config, settled_leftovers, zip_entries,
};

fn request(url: &str, shape: JobShape) -> JobRequest {
    JobRequest::new(Some(url), shape).unwrap()
}

/// Stream a delivery to the end, dropping it afterwards.
async fn consume(delivery: Delivery) -> Vec<u8> {
    let mut stream = delivery.open().await.unwrap();
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk.unwrap());
    }
    body
}

fn no_mux() -> fetch_server::config::ToolConfig {
    fake_mux("exit 99")
}

mod playlist_archive {
    use super::*;

    #[tokio::test]
    async fn test_single_item_playlist_is_archived_and_cleaned() {
        let root = TempDir::new().unwrap();
        let fetch = fake_fetch(r#"printf 'track-bytes' > "$(render 01 Track)""#);
        let pipeline = JobPipeline::new(pipeline_config(root.path(), fetch, no_mux()));

        let delivery = pipeline
            .execute(request("https://example.com/list", JobShape::PlaylistArchive))
            .await
            .unwrap();

        let expected_name = format!("Playlist-{}.zip", chrono::Local::now().format("%Y%m%d"));
        assert_eq!(delivery.filename(), expected_name);
        assert_eq!(delivery.content_type(), "application/zip");

        let body = consume(delivery).await;
        assert_eq!(
            zip_entries(&body),
            vec![("01 - Track.mp4".to_string(), b"track-bytes".to_vec())]
        );
        let left = settled_leftovers(root.path()).await;
        assert!(left.is_empty(), "left: {left:?}");
    }

    #[tokio::test]
    async fn test_entries_follow_playlist_order() {
        let root = TempDir::new().unwrap();
        let fetch = fake_fetch(
            r#"
            printf 'c' > "$(render 03 Third)"
            printf 'a' > "$(render 01 First)"
            printf 'b' > "$(render 02 Second)"
            printf 'partial' > "$(render 04 Fourth).part"
            "#,
        );
        let pipeline = JobPipeline::new(pipeline_config(root.path(), fetch, no_mux()));

        let delivery = pipeline
            .execute(request("https://example.com/list", JobShape::PlaylistArchive).with_item_hint(Some(4)))
            .await
            .unwrap();
        let body = consume(delivery).await;

        let names: Vec<String> = zip_entries(&body).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["01 - First.mp4", "02 - Second.mp4", "03 - Third.mp4"]);
        assert!(settled_leftovers(root.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_entries_past_two_digit_index_keep_playlist_order() {
        let root = TempDir::new().unwrap();
        let fetch = fake_fetch(
            r#"
            printf 'c' > "$(render 100 Hundredth)"
            printf 'a' > "$(render 09 Ninth)"
            printf 'b' > "$(render 10 Tenth)"
            "#,
        );
        let pipeline = JobPipeline::new(pipeline_config(root.path(), fetch, no_mux()));

        let delivery = pipeline
            .execute(request("https://example.com/list", JobShape::PlaylistArchive))
            .await
            .unwrap();
        let body = consume(delivery).await;

        let names: Vec<String> = zip_entries(&body).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["09 - Ninth.mp4", "10 - Tenth.mp4", "100 - Hundredth.mp4"]);
        assert!(settled_leftovers(root.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_reports_stderr_verbatim() {
        let root = TempDir::new().unwrap();
        let fetch = fake_fetch(r#"echo "ERROR: Video unavailable" 1>&2; exit 1"#);
        let pipeline = JobPipeline::new(pipeline_config(root.path(), fetch, no_mux()));

        let failure = pipeline
            .execute(request("https://example.com/list", JobShape::PlaylistArchive))
            .await
            .unwrap_err();

        assert_eq!(failure.shape, JobShape::PlaylistArchive);
        assert_eq!(failure.stage, JobState::Fetching);
        match &failure.error {
            Error::Process {
                exit_code, stderr, ..
            } => {
                assert_eq!(*exit_code, Some(1));
                assert!(stderr.contains("Video unavailable"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(settled_leftovers(root.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_nothing_produced_fails_without_archive() {
        let root = TempDir::new().unwrap();
        let fetch = fake_fetch("exit 0");
        let pipeline = JobPipeline::new(pipeline_config(root.path(), fetch, no_mux()));

        let start = std::time::Instant::now();
        let failure = pipeline
            .execute(request("https://example.com/list", JobShape::PlaylistArchive))
            .await
            .unwrap_err();

        assert!(matches!(failure.error, Error::NoArtifactsProduced { .. }));
        assert_eq!(failure.stage, JobState::Detecting);
        assert!(failure.directory.is_empty());
        // Gives up after the no-output grace, not the playlist ceiling
        assert!(start.elapsed() < Duration::from_secs(4));
        assert!(settled_leftovers(root.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_scratch_files_only_are_not_artifacts() {
        let root = TempDir::new().unwrap();
        let fetch = fake_fetch(r#"printf 'x' > "$(render 01 Track).part""#);
        let pipeline = JobPipeline::new(pipeline_config(root.path(), fetch, no_mux()));

        let failure = pipeline
            .execute(request("https://example.com/list", JobShape::PlaylistArchive))
            .await
            .unwrap_err();

        assert!(matches!(failure.error, Error::NoArtifactsProduced { .. }));
        assert_eq!(failure.directory, vec!["01 - Track.mp4.part".to_string()]);
        assert!(settled_leftovers(root.path()).await.is_empty());
    }
}

mod single_file {
    use super::*;

    #[tokio::test]
    async fn test_title_names_the_delivered_file() {
        let root = TempDir::new().unwrap();
        let fetch = fake_fetch(r#"printf 'video' > "$(render 00 ignored)""#);
        let pipeline = JobPipeline::new(pipeline_config(root.path(), fetch, no_mux()));

        let delivery = pipeline
            .execute(request("https://example.com/v", JobShape::SingleFile).with_title(Some("My Song")))
            .await
            .unwrap();

        assert_eq!(delivery.filename(), "My Song.mp4");
        assert_eq!(delivery.content_type(), "video/mp4");
        assert_eq!(delivery.size(), 5);
        assert_eq!(consume(delivery).await, b"video");
        assert!(settled_leftovers(root.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_remote_title_used_without_title() {
        let root = TempDir::new().unwrap();
        let fetch = fake_fetch(r#"printf 'audio' > "$(render 00 Remote)""#);
        let pipeline = JobPipeline::new(pipeline_config(root.path(), fetch, no_mux()));

        let delivery = pipeline
            .execute(request("https://example.com/v", JobShape::AudioOnly))
            .await
            .unwrap();

        assert_eq!(delivery.filename(), "Remote.mp4");
        assert_eq!(consume(delivery).await, b"audio");
        assert!(settled_leftovers(root.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_detection_timeout_when_output_keeps_growing() {
        let root = TempDir::new().unwrap();
        // Keeps appending in the background after the tool itself exits
        let fetch = fake_fetch(
            r#"
            f="$(render 00 Growing)"
            printf 'x' > "$f"
            ( i=0; while [ $i -lt 60 ]; do printf 'x' >> "$f" 2>/dev/null; sleep 0.02; i=$((i+1)); done ) >/dev/null 2>&1 &
            "#,
        );
        let mut config = pipeline_config(root.path(), fetch, no_mux());
        config.detector.single_max_wait = Duration::from_millis(400);
        let pipeline = JobPipeline::new(config);

        let failure = pipeline
            .execute(request("https://example.com/v", JobShape::SingleFile))
            .await
            .unwrap_err();

        assert!(matches!(failure.error, Error::Timeout { .. }), "got {:?}", failure.error);
        assert_eq!(failure.stage, JobState::Detecting);
    }
}

mod fetch_and_mux {
    use super::*;

    const TWO_LEGS: &str = r#"
        echo "[download] leg $ext" 1>&2
        printf 'leg' > "$(render 00 Track)"
    "#;

    #[tokio::test]
    async fn test_legs_are_muxed_and_intermediates_removed() {
        let root = TempDir::new().unwrap();
        let mux = fake_mux(r#"printf 'muxed' > "$out""#);
        let pipeline = JobPipeline::new(pipeline_config(root.path(), fake_fetch(TWO_LEGS), mux));

        let delivery = pipeline
            .execute(request("https://example.com/v", JobShape::FetchAndMux))
            .await
            .unwrap();

        assert_eq!(delivery.filename(), "Track.mp4");
        let job_dir = delivery.path().parent().unwrap().to_path_buf();
        // Only the muxed output is left while delivering
        assert_eq!(leftovers(&job_dir), vec!["Track.mp4".to_string()]);

        assert_eq!(consume(delivery).await, b"muxed");
        assert!(settled_leftovers(root.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_mux_failure_carries_fetch_diagnostics() {
        let root = TempDir::new().unwrap();
        let mux = fake_mux(r#"echo "Invalid data found when processing input" 1>&2; exit 1"#);
        let pipeline = JobPipeline::new(pipeline_config(root.path(), fake_fetch(TWO_LEGS), mux));

        let failure = pipeline
            .execute(request("https://example.com/v", JobShape::FetchAndMux))
            .await
            .unwrap_err();

        assert_eq!(failure.stage, JobState::PostProcessing);
        match &failure.error {
            Error::Mux {
                exit_code,
                stderr,
                fetch_stderr,
            } => {
                assert_eq!(*exit_code, Some(1));
                assert!(stderr.contains("Invalid data"));
                assert!(fetch_stderr.contains("leg mp4"));
                assert!(fetch_stderr.contains("leg m4a"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let mut directory = failure.directory.clone();
        directory.sort();
        assert_eq!(directory, vec!["Track.audio.m4a", "Track.video.mp4"]);
        assert!(settled_leftovers(root.path()).await.is_empty());
    }
}

mod isolation {
    use super::*;

    fn shared(config: PipelineConfig) -> PipelineConfig {
        PipelineConfig {
            workspace_mode: WorkspaceMode::Shared,
            ..config
        }
    }

    #[tokio::test]
    async fn test_concurrent_jobs_in_shared_root_only_touch_their_own_files() {
        let root = TempDir::new().unwrap();
        let foreign = root.path().join("someoneelse__01 - Track.mp4");
        std::fs::write(&foreign, b"foreign").unwrap();

        // The failing job leaves output behind and exits while the other is still fetching
        let fetch = fake_fetch(
            r#"
            case "$url" in
              *fail*)
                printf 'doomed' > "$(render 01 Track)"
                echo "ERROR: boom" 1>&2
                exit 1 ;;
              *)
                sleep 0.3
                printf 'kept' > "$(render 01 Track)" ;;
            esac
            "#,
        );
        let pipeline = JobPipeline::new(shared(pipeline_config(root.path(), fetch, no_mux())));

        let (ok, failed) = tokio::join!(
            pipeline.execute(request("https://example.com/ok", JobShape::PlaylistArchive)),
            pipeline.execute(request("https://example.com/fail", JobShape::PlaylistArchive)),
        );

        let failure = failed.unwrap_err();
        assert_eq!(failure.directory.len(), 1);
        assert!(failure.directory[0].starts_with(&format!("{}__", failure.job_id)));

        let body = consume(ok.unwrap()).await;
        assert_eq!(
            zip_entries(&body),
            vec![("01 - Track.mp4".to_string(), b"kept".to_vec())]
        );

        assert_eq!(
            leftovers(root.path()),
            vec!["someoneelse__01 - Track.mp4".to_string()]
        );
    }

    #[tokio::test]
    async fn test_scoped_jobs_use_separate_directories() {
        let root = TempDir::new().unwrap();
        let fetch = fake_fetch(r#"printf "$url" > "$(render 00 Same)""#);
        let pipeline = JobPipeline::new(pipeline_config(root.path(), fetch, no_mux()));

        let (a, b) = tokio::join!(
            pipeline.execute(request("https://example.com/a", JobShape::SingleFile)),
            pipeline.execute(request("https://example.com/b", JobShape::SingleFile)),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.path(), b.path());

        assert_eq!(consume(a).await, b"https://example.com/a");
        assert_eq!(consume(b).await, b"https://example.com/b");
        assert!(settled_leftovers(root.path()).await.is_empty());
    }
}

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn test_dropping_a_running_job_disposes_it() {
        let root = TempDir::new().unwrap();
        let fetch = fake_fetch(
            r#"
            printf 'partial' > "$(render 01 Track).part"
            sleep 5
            "#,
        );
        let pipeline = JobPipeline::new(pipeline_config(root.path(), fetch, no_mux()));

        let result = tokio::time::timeout(
            Duration::from_millis(500),
            pipeline.execute(request("https://example.com/list", JobShape::PlaylistArchive)),
        )
        .await;

        assert!(result.is_err(), "job should still be fetching");
        let left = settled_leftovers(root.path()).await;
        assert!(left.is_empty(), "left: {left:?}");
    }

    #[tokio::test]
    async fn test_client_abort_mid_delivery_disposes_terminal_artifact() {
        let root = TempDir::new().unwrap();
        let fetch = fake_fetch(r#"head -c 300000 /dev/zero > "$(render 00 Big)""#);
        let pipeline = JobPipeline::new(pipeline_config(root.path(), fetch, no_mux()));

        let delivery = pipeline
            .execute(request("https://example.com/v", JobShape::SingleFile))
            .await
            .unwrap();
        assert_eq!(delivery.size(), 300_000);

        let mut stream = delivery.open().await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert!(!first.is_empty());
        assert!(!leftovers(root.path()).is_empty());

        drop(stream);
        assert!(settled_leftovers(root.path()).await.is_empty());
    }
}
