pub mod mock;

#[cfg(feature = "backend-opencv")]
pub mod opencv;
