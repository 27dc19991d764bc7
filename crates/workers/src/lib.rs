pub mod batch_worker;
pub mod dispatcher;
pub mod job_creator;

#[cfg(test)]
pub(crate) mod test_support;
