use once_cell::sync::Lazy;

/// True when this process can run the vector-instruction-friendly kernels. It is detected once, on first use.
pub static VECTOR_INSTRUCTIONS_AVAILABLE: Lazy<bool> = Lazy::new(detect_vector_instructions);

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn detect_vector_instructions() -> bool {
	is_x86_feature_detected!("avx2")
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn detect_vector_instructions() -> bool {
	false
}

/// These are the options that control `bin_sums` and `bin_sums_parallel`.
#[derive(Clone, Debug)]
pub struct BinSumsOptions {
	/// If true, terms whose bit pack has a compiled specialization use it, so the loop that unpacks a word is fully unrolled. If false, every term uses the kernel that reads the bit pack at runtime. This defaults to `VECTOR_INSTRUCTIONS_AVAILABLE`.
	pub use_bit_pack_specializations: bool,
	/// In debug builds, every sample's gradients summed across scores must lie within this distance of zero for losses that produce centered gradients. The value depends on the loss, so there is no default and the check is skipped when this is `None`.
	pub centered_gradient_epsilon: Option<f64>,
}

impl Default for BinSumsOptions {
	fn default() -> Self {
		Self {
			use_bit_pack_specializations: *VECTOR_INSTRUCTIONS_AVAILABLE,
			centered_gradient_epsilon: None,
		}
	}
}
