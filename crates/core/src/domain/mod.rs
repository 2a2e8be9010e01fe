pub mod approval;
pub mod beneficiary;
pub mod journal;
pub mod request;
