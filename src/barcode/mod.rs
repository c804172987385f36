//! Barcode normalization for upstream lookups.
//!
//! The upstream barcode endpoint wants GTIN-13. Clients scan anything from
//! 6-digit UPC-E to EAN-13, so shorter formats are expanded or zero-padded
//! here before the proxied call.

use crate::error::{GatewayError, Result};

/// Normalizes a scanned barcode to GTIN-13.
///
/// - 6 digits: UPC-E body, expanded with number system 0;
/// - 8 digits: UPC-E with leading number system and trailing check digit;
/// - 9 to 12 digits: zero-padded to 13;
/// - 13 digits: passed through;
/// - anything else: rejected.
pub fn normalize_barcode(barcode: &str) -> Result<String> {
    if barcode.is_empty() || !barcode.chars().all(|c| c.is_ascii_digit()) {
        return Err(GatewayError::InvalidRequest(
            "Invalid barcode format. Must contain only digits".to_string(),
        ));
    }

    match barcode.len() {
        6 => convert_upce_to_gtin13(barcode, '0'),
        8 => {
            let number_system = barcode
                .chars()
                .next()
                .ok_or_else(|| GatewayError::InvalidRequest("empty barcode".to_string()))?;
            // The trailing check digit of the UPC-E form is dropped; the
            // GTIN-13 check digit is recomputed from the expanded body.
            convert_upce_to_gtin13(&barcode[1..7], number_system)
        }
        len if len < 13 => Ok(format!("{barcode:0>13}")),
        13 => Ok(barcode.to_string()),
        _ => Err(GatewayError::InvalidRequest(
            "Invalid barcode format. Must not exceed 13 digits".to_string(),
        )),
    }
}

/// Expands a 6-digit UPC-E body to GTIN-13 using the given number system,
/// recomputing the check digit.
pub fn convert_upce_to_gtin13(upce: &str, number_system: char) -> Result<String> {
    if upce.len() != 6 || !upce.chars().all(|c| c.is_ascii_digit()) {
        return Err(GatewayError::InvalidRequest(
            "UPC-E must be exactly 6 digits".to_string(),
        ));
    }

    let last = &upce[5..6];
    let upca_body = match last {
        "0" | "1" | "2" => format!("{}{}0000{}", &upce[0..2], last, &upce[2..5]),
        "3" => format!("{}00000{}", &upce[0..3], &upce[3..5]),
        "4" => format!("{}00000{}", &upce[0..4], &upce[4..5]),
        "5" | "6" | "7" | "8" | "9" => format!("{}0000{}", &upce[0..5], last),
        _ => {
            return Err(GatewayError::InvalidRequest(
                "Invalid UPC-E format".to_string(),
            ))
        }
    };

    let upca11 = format!("{number_system}{upca_body}");
    let check_digit = calculate_upc_check_digit(&upca11)?;
    let full_upca = format!("{upca11}{check_digit}");
    Ok(format!("{full_upca:0>13}"))
}

/// Computes the 12th digit (check digit) for an 11-digit UPC-A base.
pub fn calculate_upc_check_digit(upc11: &str) -> Result<u32> {
    if upc11.len() != 11 || !upc11.chars().all(|c| c.is_ascii_digit()) {
        return Err(GatewayError::InvalidRequest(
            "UPC-A base must be 11 digits".to_string(),
        ));
    }

    let digits: Vec<u32> = upc11.chars().filter_map(|c| c.to_digit(10)).collect();
    let odd_sum: u32 = digits.iter().step_by(2).sum();
    let even_sum: u32 = digits.iter().skip(1).step_by(2).sum();
    let total = odd_sum * 3 + even_sum;
    Ok((10 - (total % 10)) % 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upce_with_low_final_digit_expands_to_gtin13() {
        // 123450: last digit 0 -> body 12_0_0000_345, check digit 5
        let gtin = convert_upce_to_gtin13("123450", '0').unwrap();
        assert_eq!(gtin, "0012000003455");
    }

    #[test]
    fn check_digit_matches_hand_computation() {
        assert_eq!(calculate_upc_check_digit("01200000345").unwrap(), 5);
    }

    #[test]
    fn short_barcodes_are_zero_padded() {
        assert_eq!(normalize_barcode("123456789012").unwrap(), "0123456789012");
        assert_eq!(normalize_barcode("123456789").unwrap(), "0000123456789");
    }

    #[test]
    fn thirteen_digit_barcodes_pass_through() {
        assert_eq!(normalize_barcode("4006381333931").unwrap(), "4006381333931");
    }

    #[test]
    fn eight_digit_upce_uses_leading_number_system() {
        let direct = convert_upce_to_gtin13("123450", '0').unwrap();
        let eight = normalize_barcode("01234505").unwrap();
        assert_eq!(eight, direct);
    }

    #[test]
    fn non_digit_and_oversized_barcodes_are_rejected() {
        assert!(normalize_barcode("12345a").is_err());
        assert!(normalize_barcode("").is_err());
        assert!(normalize_barcode("12345678901234").is_err());
    }

    #[test]
    fn upce_final_digit_families_expand_differently() {
        // last digit 3 -> first three digits kept
        let three = convert_upce_to_gtin13("123453", '0').unwrap();
        assert!(three.contains("12300000"));
        // last digit 9 -> five leading digits kept, trailing 9 restored
        let nine = convert_upce_to_gtin13("123459", '0').unwrap();
        assert!(nine.contains("1234500009"));
    }
}
