pub mod minmax_heap;

pub use minmax_heap::MinMaxHeap;
