// tests/sge_commands.rs

//! SGE command shaping and response parsing.

use std::path::Path;

use gridflow::executor::{GridCommands, QueueStatus, SgeCommands};
use gridflow::errors::GridflowError;
use gridflow_test_utils::builders::TaskRunBuilder;

#[test]
fn submit_command_line_emits_all_options_in_order() {
    let task = TaskRunBuilder::new("task x")
        .work_dir("/abc")
        .queue("my-queue")
        .max_memory("2GB")
        .max_duration("3h")
        .cluster_options("-extra opt")
        .build();

    let argv = SgeCommands
        .submit_command_line(&task, Path::new("/abc/.job.sh"))
        .unwrap();

    let expected: Vec<&str> = vec![
        "qsub", "-wd", "/abc", "-N", "nf-task_x", "-o", "/dev/null", "-j", "y", "-terse",
        "-V", "-q", "my-queue", "-l", "h_rt=03:00:00", "-l", "virtual_free=2G", "-extra",
        "opt", ".job.sh",
    ];
    assert_eq!(argv, expected);
}

#[test]
fn submit_command_line_omits_unset_options() {
    let task = TaskRunBuilder::new("foo").work_dir("/work/ab/cdef").build();

    let argv = SgeCommands
        .submit_command_line(&task, Path::new("/work/ab/cdef/.command.sh"))
        .unwrap();

    let expected: Vec<&str> = vec![
        "qsub",
        "-wd",
        "/work/ab/cdef",
        "-N",
        "nf-foo",
        "-o",
        "/dev/null",
        "-j",
        "y",
        "-terse",
        "-V",
        ".command.sh",
    ];
    assert_eq!(argv, expected);
}

#[test]
fn job_names_collapse_non_alphanumeric_runs() {
    let task = TaskRunBuilder::new("run (2) - step.3").work_dir("/w").build();
    assert_eq!(task.sanitized_name(), "run_2_step_3");
}

#[test]
fn configured_name_overrides_the_task_name_for_jobs() {
    let mut task = TaskRunBuilder::new("internal-id").work_dir("/w").build();
    task.config.name = Some("nice name".to_string());

    assert_eq!(task.sanitized_name(), "nice_name");
    let argv = SgeCommands
        .submit_command_line(&task, Path::new("/w/.command.sh"))
        .unwrap();
    assert!(argv.contains(&"nf-nice_name".to_string()));
}

#[test]
fn wall_time_is_rendered_as_padded_clock() {
    let argv = |duration: &str| {
        let task = TaskRunBuilder::new("t")
            .work_dir("/w")
            .max_duration(duration)
            .build();
        SgeCommands
            .submit_command_line(&task, Path::new("/w/.command.sh"))
            .unwrap()
    };

    assert!(argv("90s").contains(&"h_rt=00:01:30".to_string()));
    assert!(argv("3h").contains(&"h_rt=03:00:00".to_string()));
    assert!(argv("1d").contains(&"h_rt=24:00:00".to_string()));
}

#[test]
fn memory_limits_drop_the_trailing_byte_suffix() {
    let argv = |memory: &str| {
        let task = TaskRunBuilder::new("t")
            .work_dir("/w")
            .max_memory(memory)
            .build();
        SgeCommands
            .submit_command_line(&task, Path::new("/w/.command.sh"))
            .unwrap()
    };

    assert!(argv("2GB").contains(&"virtual_free=2G".to_string()));
    assert!(argv("512MB").contains(&"virtual_free=512M".to_string()));
    assert!(argv("4G").contains(&"virtual_free=4G".to_string()));
}

#[test]
fn job_id_is_the_last_digit_token() {
    let id = SgeCommands.parse_job_id("blah\n..\n6472\n").unwrap();
    assert_eq!(id, "6472");

    // -terse output: just the id.
    assert_eq!(SgeCommands.parse_job_id("123\n").unwrap(), "123");
}

#[test]
fn missing_job_id_is_a_parse_error() {
    let err = SgeCommands.parse_job_id("no digits here\n").unwrap_err();
    assert!(matches!(err, GridflowError::ParseError(_)));
}

#[test]
fn kill_command_shapes_qdel() {
    assert_eq!(SgeCommands.kill_command("123"), vec!["qdel", "-j", "123"]);
}

#[test]
fn queue_status_command_optionally_names_the_queue() {
    assert_eq!(SgeCommands.queue_status_command(None), vec!["qstat"]);
    assert_eq!(
        SgeCommands.queue_status_command(Some("long")),
        vec!["qstat", "-q", "long"]
    );
}

const QSTAT_OUTPUT: &str = "\
job-ID  prior   name       user         state submit/start at     queue                          slots ja-task-ID
-----------------------------------------------------------------------------------------------------------------
7548318 0.00050 nf-exec_10 pditommaso   r     02/10/2014 12:30:51 long@node-hp0214.linux.crg.es      1
7548348 0.00050 nf-exec_15 pditommaso   r     02/10/2014 12:30:51 long@node-hp0520.linux.crg.es      1
7548349 0.00050 nf-exec_16 pditommaso   hqw   02/10/2014 12:30:51 long@node-hp0321.linux.crg.es      1
7548904 0.00050 nf-exec_25 pditommaso   qw    02/10/2014 12:31:21                                    1
7548960 0.00050 nf-exec_30 pditommaso   Eqw   02/10/2014 12:31:55                                    1
";

#[test]
fn queue_status_maps_state_codes() {
    let statuses = SgeCommands.parse_queue_status(QSTAT_OUTPUT);

    assert_eq!(statuses.len(), 5);
    assert_eq!(statuses["7548318"], QueueStatus::Running);
    assert_eq!(statuses["7548348"], QueueStatus::Running);
    assert_eq!(statuses["7548349"], QueueStatus::Hold);
    assert_eq!(statuses["7548904"], QueueStatus::Pending);
    assert_eq!(statuses["7548960"], QueueStatus::Error);
}

#[test]
fn queue_status_covers_the_full_state_table() {
    let render = |state: &str| {
        format!(
            "header\n----\n1 0.5 name user {state} 01/01/2024 00:00:00 q 1\n"
        )
    };

    for state in ["r", "t", "s", "R"] {
        let statuses = SgeCommands.parse_queue_status(&render(state));
        assert_eq!(statuses["1"], QueueStatus::Running, "state {state}");
    }
    assert_eq!(
        SgeCommands.parse_queue_status(&render("hRwq"))["1"],
        QueueStatus::Hold
    );
    assert_eq!(
        SgeCommands.parse_queue_status(&render("Erq"))["1"],
        QueueStatus::Error
    );
    assert_eq!(
        SgeCommands.parse_queue_status(&render("z"))["1"],
        QueueStatus::Unknown
    );
}

#[test]
fn queue_status_of_empty_output_is_empty() {
    assert!(SgeCommands.parse_queue_status("").is_empty());
    // Header only, no jobs.
    assert!(SgeCommands
        .parse_queue_status("job-ID prior name\n--------------\n")
        .is_empty());
}
