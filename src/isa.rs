/// Instruction-set families a pipeline can be instantiated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsaKind {
    /// Portable scalar code, the numerical reference.
    AnyArch,
    /// x86_64 AVX2.
    Avx2,
    /// aarch64 Advanced SIMD.
    Neon,
}

impl IsaKind {
    /// Whether kernels for this instruction set can run on the current machine.
    pub fn is_supported(self) -> bool {
        match self {
            IsaKind::AnyArch => true,
            IsaKind::Avx2 => {
                #[cfg(target_arch = "x86_64")]
                {
                    is_x86_feature_detected!("avx2")
                }
                #[cfg(not(target_arch = "x86_64"))]
                {
                    false
                }
            }
            IsaKind::Neon => cfg!(target_arch = "aarch64"),
        }
    }
}

/// Static instruction-set selector. Pipelines are generic over it so one chain
/// can be instantiated once per vector width.
pub trait InstructionSet {
    const KIND: IsaKind;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnyArch;

#[derive(Debug, Clone, Copy, Default)]
pub struct Avx2;

#[derive(Debug, Clone, Copy, Default)]
pub struct Neon;

impl InstructionSet for AnyArch {
    const KIND: IsaKind = IsaKind::AnyArch;
}

impl InstructionSet for Avx2 {
    const KIND: IsaKind = IsaKind::Avx2;
}

impl InstructionSet for Neon {
    const KIND: IsaKind = IsaKind::Neon;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_arch_always_supported() {
        assert!(IsaKind::AnyArch.is_supported());
        assert_eq!(<AnyArch as InstructionSet>::KIND, IsaKind::AnyArch);
    }

    #[cfg(target_arch = "aarch64")]
    #[test]
    fn test_avx2_unsupported_on_arm() {
        assert!(!IsaKind::Avx2.is_supported());
        assert!(IsaKind::Neon.is_supported());
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_neon_unsupported_on_x86() {
        assert!(!IsaKind::Neon.is_supported());
    }
}
