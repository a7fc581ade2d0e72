pub mod compositor;
pub mod resample;
pub mod transform;
