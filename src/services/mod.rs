pub(crate) mod ai_client;
pub(crate) mod answer_matching;
pub(crate) mod documents;
pub(crate) mod exam_timer;
pub(crate) mod grading;
pub(crate) mod json_extract;
pub(crate) mod question_extraction;
pub(crate) mod question_order;
pub(crate) mod session_progress;
pub(crate) mod storage;
