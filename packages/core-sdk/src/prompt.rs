use crate::models::GenerationRequest;

/** \brief 输出 token 上限，与服务商无关的固定策略。 */
pub const MAX_OUTPUT_TOKENS_CEILING: u32 = 4000;

/**
 * \brief 一次生成所需的两段提示词。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

/**
 * \brief 由请求确定性地构造 system/user 提示词，相同请求得到逐字节相同的结果。
 */
pub fn build(request: &GenerationRequest) -> PromptPair {
    PromptPair {
        system: system_instruction(&request.tone),
        user: user_instruction(request),
    }
}

/**
 * \brief 生成调用的 token 上限：`min(word_count * 2, 4000)`。
 */
pub fn max_output_tokens(word_count: u32) -> u32 {
    word_count
        .saturating_mul(2)
        .min(MAX_OUTPUT_TOKENS_CEILING)
}

fn system_instruction(tone: &str) -> String {
    format!(
        r#"You are an expert SEO content writer. Your task is to create high-quality, SEO-optimized blog posts that rank well in search engines.

Writing Guidelines:
- Tone: {tone}
- Follow SEO best practices for content structure
- Use the focus keyword strategically throughout the content
- Create engaging, readable content that provides value
- Include proper heading hierarchy (H1, H2, H3)
- Write compelling meta descriptions
- Ensure content flows naturally while being SEO-optimized

Content Structure Requirements:
1. SEO Title (60 characters max)
2. Meta Description (155 characters max)
3. H1 Tag (include focus keyword)
4. Introduction paragraph
5. Main content with H2 and H3 subheadings
6. FAQ section (if requested)
7. Conclusion
8. Schema markup (if requested)

Output Format:
Return the content as a single JSON object with the following structure:
{{
  "seo_title": "SEO optimized title",
  "meta_description": "Meta description",
  "h1_tag": "Main H1 heading",
  "content": "Full article content with proper HTML formatting",
  "h2_tags": ["H2 heading 1", "H2 heading 2"],
  "h3_tags": ["H3 heading 1", "H3 heading 2"],
  "faq_section": "FAQ content if requested",
  "schema_markup": "JSON-LD schema markup if requested"
}}"#
    )
}

fn user_instruction(request: &GenerationRequest) -> String {
    format!(
        r#"Create a comprehensive, SEO-optimized blog post about "{keyword}".

Requirements:
- Focus keyword: {keyword}
- Target word count: {word_count} words
- Writing tone: {tone}
- Include FAQ section: {faq}
- Include schema markup: {schema}

Make sure to:
1. Use the focus keyword in the title, H1, and throughout the content naturally
2. Create engaging subheadings that include related keywords
3. Write content that answers user intent for the keyword
4. Include actionable insights and valuable information
5. Optimize for readability and SEO

Return the content in the specified JSON format."#,
        keyword = request.keyword,
        word_count = request.word_count,
        tone = request.tone,
        faq = request.include_faq,
        schema = request.include_schema,
    )
}
