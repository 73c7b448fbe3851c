mod create;
mod files;
mod list;
mod manage;

pub(super) use create::create_exam;
pub(super) use files::{delete_file, upload_file};
pub(super) use list::{list_exam_results, list_exams};
pub(super) use manage::{archive_exam, delete_exam, get_exam, publish_exam, update_exam};
