pub(crate) mod exam_files;
pub(crate) mod exams;
pub(crate) mod health;
pub(crate) mod results;
pub(crate) mod sessions;
pub(crate) mod users;
