pub(crate) mod diary;
pub(crate) mod emotion;
