mod maintenance;
mod worker;

pub(crate) use maintenance::{auto_submit_expired_sessions, requeue_stale_grading};
pub(crate) use worker::{claim_next_session, process_session};
