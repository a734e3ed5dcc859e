//! 채팅 메시지 처리
//!
//! 미리 정의된 질문 목록, 번호 입력 해석, 안내 문구, 답변 이미지 저장을 담당합니다.
//! 터미널 대화 루프는 `cli`에서 이 함수들 위에 얇게 구현합니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::extractor::image::{decode_image, sniff_image_extension};

pub const WELCOME_MESSAGE: &str = "Welcome to DILO-CHATBOT Assistant!\n\n\
Hi there! I'm here to help you with information about our high-pressure application valve \
system and the MIRROR-ANALYSER SF6. You can choose from predefined questions or ask your own.";

pub const FOLLOW_UP_MESSAGE: &str = "Would you like to ask another question?";

pub const GOODBYE_MESSAGE: &str = "Thank you for using DILO-CHATBOT Assistant. Have a great day!";

/// 미리 정의된 질문 목록
pub const PREDEFINED_QUESTIONS: &[&str] = &[
    "Visualize an industrial setting where an orange-colored rugged tablet sits on a grey workbench. Include a display screen, a small metallic object beside the tablet, and a sticker with a blue circular symbol. The environment should reflect a technical or workshop space with the focus on the tablet as a tool for industrial operations.",
    "Describe the setup of a black automotive battery with yellow terminal caps, focusing on the attached red cable with a heavy-duty clamp and the shiny metal nuts and bolts lying on the battery. Emphasize the battery's protective features and its role in an automotive electrical system.",
    "Why are the yellow caps used on the positive and negative terminals of the battery?",
    "What are the key features visible in the top right corner of the automotive battery?",
    "What is the purpose of the rugged orange-colored electronic device shown in the image?",
    "What kind of electronic device is housed inside the rugged carrying case, and what are its functions?",
    "Can the MIRROR-ANALYSER SF6 be used with gas collecting bags? If so, how?",
    "What is the maximum number of measurements that can be stored on the MIRROR-ANALYSER SF6 device?",
    "What is the maximum inlet pressure that the MIRROR-ANALYSER SF6 can handle?",
    "How does the external compressor accessory enhance the function of the MIRROR-ANALYSER SF6?",
    "How does the MIRROR-ANALYSER SF6 determine the moisture concentration?",
    "What measurement principles are used for determining the SF6 volume percentage and SO2 concentration?",
    "What are the three quality parameters that the MIRROR-ANALYSER SF6 can measure in a single test?",
    "Which sensors are interchangeable in the MIRROR-ANALYSER SF6, and why is this feature important?",
    "Describe the role of the integrated gas return system in the MIRROR-ANALYSER SF6.",
    "What are the physical dimensions and weight of the device?",
    "What is the inlet pressure range, temperature range, and maximum ambient moisture the device can operate in?",
    "How long does it take for the device to perform a measurement?",
    "What is the accuracy of the SF6 volume percentage measurement?",
    "What is the measurement range and accuracy for SO2 concentration?",
    "How often should the device be calibrated to maintain its accuracy?",
    "What are the differences between the single, two-in-one, and three-in-one measuring devices for moisture, SF6, and SO2 measurements?",
    "What optional accessories are available for increasing pressure in medium voltage switchgear with a pressure of less than 0.2 bar?",
    "How can the external compressor and gas collecting bag be used with the device?",
    "Summarize the key physical and operational specifications of the MIRROR-ANALYSER SF6.",
    "Generate a detailed explanation of the measurement ranges and accuracy for moisture, SF6 volume percentage, and SO2 concentration.",
    "Describe the calibration requirements and intervals for the MIRROR-ANALYSER SF6.",
    "Compare the different models of the MIRROR-ANALYSER SF6 (e.g., 3-035R-R301, 3-035R-R302, 3-035R-R303).",
    "List the available accessories for increasing pressure in medium voltage switchgear and explain their use with the MIRROR-ANALYSER SF6.",
    "What kind of electronic device is housed inside the rugged carrying case, and what are its functions?",
];

// ============================================================================
// Input Handling
// ============================================================================

/// 입력 해석
///
/// `1..=len` 범위의 숫자는 해당 번호의 미리 정의된 질문으로 바뀌고,
/// 그 외 입력(범위 밖 숫자 포함)은 그대로 질문으로 사용됩니다.
pub fn resolve_question(input: &str) -> String {
    let trimmed = input.trim();

    match trimmed.parse::<usize>() {
        Ok(n) if (1..=PREDEFINED_QUESTIONS.len()).contains(&n) => {
            PREDEFINED_QUESTIONS[n - 1].to_string()
        }
        _ => trimmed.to_string(),
    }
}

/// 번호가 붙은 질문 목록 ("1. ...\n2. ...")
pub fn format_question_list() -> String {
    PREDEFINED_QUESTIONS
        .iter()
        .enumerate()
        .map(|(i, q)| format!("{}. {}", i + 1, q))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 대화 루프 입력
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    /// 빈 줄
    Empty,
    /// 질문 목록 보기
    ListQuestions,
    /// 대화 종료
    Quit,
    /// 질문 (번호는 이미 해석됨)
    Ask(String),
}

/// 한 줄 입력을 대화 동작으로 변환
pub fn parse_input(line: &str) -> ChatInput {
    let trimmed = line.trim();

    match trimmed.to_lowercase().as_str() {
        "" => ChatInput::Empty,
        "list" | "questions" | "?" => ChatInput::ListQuestions,
        "exit" | "quit" | "end" | "q" => ChatInput::Quit,
        _ => ChatInput::Ask(resolve_question(trimmed)),
    }
}

// ============================================================================
// Images
// ============================================================================

/// 답변 이미지 저장
///
/// base64 이미지를 `image_1.<ext>`, `image_2.<ext>` ... 로 저장합니다.
/// 확장자는 매직 바이트로 판별합니다.
pub fn save_images(dir: &Path, images: &[String]) -> Result<Vec<PathBuf>> {
    if images.is_empty() {
        return Ok(vec![]);
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create image directory: {:?}", dir))?;

    let mut paths = Vec::with_capacity(images.len());
    for (idx, image) in images.iter().enumerate() {
        let bytes = decode_image(image).with_context(|| format!("Failed to decode image {}", idx + 1))?;
        let path = dir.join(format!("image_{}.{}", idx + 1, sniff_image_extension(&bytes)));

        std::fs::write(&path, &bytes).with_context(|| format!("Failed to write image: {:?}", path))?;
        paths.push(path);
    }

    Ok(paths)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::image::encode_image;
    use tempfile::TempDir;

    #[test]
    fn test_predefined_question_count() {
        assert_eq!(PREDEFINED_QUESTIONS.len(), 30);
    }

    #[test]
    fn test_resolve_question_by_number() {
        assert_eq!(resolve_question("1"), PREDEFINED_QUESTIONS[0]);
        assert_eq!(resolve_question(" 30 "), PREDEFINED_QUESTIONS[29]);
    }

    #[test]
    fn test_resolve_question_out_of_range() {
        assert_eq!(resolve_question("0"), "0");
        assert_eq!(resolve_question("31"), "31");
        assert_eq!(resolve_question("-2"), "-2");
    }

    #[test]
    fn test_resolve_question_free_text() {
        assert_eq!(
            resolve_question("How heavy is the device?"),
            "How heavy is the device?"
        );
    }

    #[test]
    fn test_format_question_list() {
        let list = format_question_list();
        assert!(list.starts_with("1. Visualize an industrial setting"));
        assert!(list.contains("\n9. What is the maximum inlet pressure"));
        assert_eq!(list.lines().count(), 30);
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("   "), ChatInput::Empty);
        assert_eq!(parse_input("QUIT"), ChatInput::Quit);
        assert_eq!(parse_input("list"), ChatInput::ListQuestions);
        assert_eq!(parse_input("3"), ChatInput::Ask(PREDEFINED_QUESTIONS[2].to_string()));
        assert_eq!(parse_input("why?"), ChatInput::Ask("why?".to_string()));
    }

    #[test]
    fn test_save_images() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("answers");
        let images = vec![
            encode_image(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A]),
            encode_image(&[0xFF, 0xD8, 0xFF, 0xE0]),
        ];

        let paths = save_images(&out, &images).unwrap();

        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("image_1.png"));
        assert!(paths[1].ends_with("image_2.jpg"));
        assert_eq!(std::fs::read(&paths[1]).unwrap(), vec![0xFF, 0xD8, 0xFF, 0xE0]);
    }

    #[test]
    fn test_save_images_invalid_base64() {
        let dir = TempDir::new().unwrap();
        assert!(save_images(dir.path(), &["%%%".to_string()]).is_err());
        assert!(save_images(dir.path(), &[]).unwrap().is_empty());
    }
}
