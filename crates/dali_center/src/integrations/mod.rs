pub mod dali_center;
