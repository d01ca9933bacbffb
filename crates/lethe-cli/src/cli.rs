use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "lethe",
    about = "Right-to-erasure orchestration over the partitioned health data lake",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Consume the request log's change stream and execute approved requests.
    Run {
        /// Requests processed concurrently.
        #[arg(long, default_value_t = 4)]
        max_in_flight: usize,
    },

    /// Execute one approved request immediately.
    Process {
        request_id: String,
    },

    /// Show one request, including its audit trail.
    Status {
        request_id: String,
    },

    /// List requests with a given status.
    List {
        /// PENDING | APPROVED | PROCESSING | COMPLETED | FAILED
        #[arg(long, default_value = "PENDING")]
        status: String,
    },

    /// Create a new PENDING erasure request.
    Submit {
        /// 64-char lowercase hex SHA-256 digest of the patient identifier.
        #[arg(long)]
        patient_id_hash: String,

        #[arg(long, default_value = "ops-cli")]
        requester: String,
    },

    /// Flip a PENDING request to APPROVED. Stands in for the approval
    /// front-end during local operation.
    Approve {
        request_id: String,
    },

    /// Run one full erasure against the in-memory simulation and print the
    /// resulting audit trail. Needs no AWS environment.
    Demo,
}
