//! CUDA source of the sparse scan kernel.
//!
//! One thread block per batch row, one thread per state. The current and next
//! state vectors live in a `2 * C` shared-memory buffer that is swapped after
//! every frame; each new vector is also written out to `alpha`.

use crate::algebra::{Algebra, Scalar};

/// Kernel entry point name.
pub(super) const SCAN_FN: &str = "sparse_mv_scan";

const SOURCE: &str = r#"
__device__ __forceinline__ FLOAT logsumexp2(FLOAT a, FLOAT b) {
    FLOAT hi = a > b ? a : b;
    FLOAT lo = a > b ? b : a;
    if (isinf(hi) && hi < 0) {
        return hi;
    }
    return hi + log1p(exp(lo - hi));
}

__device__ __forceinline__ FLOAT max2(FLOAT a, FLOAT b) {
    return a >= b ? a : b;
}

extern "C" __global__ void sparse_mv_scan(
    FLOAT* alpha,
    const FLOAT* Ms,
    const int* idx,
    int T, int N, int C, int nz,
    FLOAT zero
) {
    extern __shared__ unsigned char scratch[];
    FLOAT* prev = reinterpret_cast<FLOAT*>(scratch);
    FLOAT* next = prev + C;

    const int n = blockIdx.x;
    const int c = threadIdx.x;

    if (c < C) {
        prev[c] = alpha[n * C + c];
    }
    __syncthreads();

    for (int t = 0; t < T; t++) {
        if (c < C) {
            const FLOAT* m = Ms + ((long long)(t * N + n) * C + c) * nz;
            FLOAT acc = zero;
            for (int k = 0; k < nz; k++) {
                acc = ADD(acc, m[k] + prev[idx[c * nz + k]]);
            }
            next[c] = acc;
            alpha[((long long)(t + 1) * N + n) * C + c] = acc;
        }
        __syncthreads();
        FLOAT* tmp = prev;
        prev = next;
        next = tmp;
    }
}
"#;

/// Kernel source specialized for scalar type `A::Scalar` and the ⊕ of `A`.
///
/// Both algebras use `+` as ⊗, so only ⊕ varies.
pub(super) fn source<A: Algebra>() -> String {
    SOURCE
        .replace("FLOAT", <A::Scalar as Scalar>::KERNEL_TYPE)
        .replace("ADD", A::kernel_add())
}

/// Module name under which the specialized kernel is cached on the device.
pub(super) fn module_name<A: Algebra>() -> String {
    format!(
        "sparse_scan_{}_{}",
        A::name(),
        <A::Scalar as Scalar>::KERNEL_TYPE
    )
}
