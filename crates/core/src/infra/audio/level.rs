//! レベルメーター用の音量計算（RMS → dBFS → 0.0〜1.0）

/// メーター下限 (dBFS)。これ以下は無音扱い
pub const FLOOR_DB: f32 = -60.0;

/// 二乗平均平方根。空配列は 0.0
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// RMS をデシベル (dBFS) に変換する。[FLOOR_DB, 0.0] にクランプ
pub fn rms_to_db(rms: f32) -> f32 {
    if rms <= 0.0 || !rms.is_finite() {
        return FLOOR_DB;
    }
    (20.0 * rms.log10()).clamp(FLOOR_DB, 0.0)
}

/// サンプル列のメーター値 (0.0 = 無音, 1.0 = フルスケール)
pub fn normalized_level(samples: &[f32]) -> f32 {
    let db = rms_to_db(rms(samples));
    (db - FLOOR_DB) / -FLOOR_DB
}
