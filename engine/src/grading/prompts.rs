//! Prompt construction
//!
//! Pure functions assembling the three prompts the pipeline sends. The
//! wording is load-bearing: the evaluation template teaches the model the
//! `###` block format the parser expects, so template and parser must only
//! ever change together. Interpolation is plain `format!`, which treats the
//! document text as data: braces or `###` sequences inside a document
//! cannot alter the template structure.

use super::Criterion;

/// Render the rubric as a numbered list: `1. <название> (<балл> баллов)`.
pub fn format_criteria(criteria: &[Criterion]) -> String {
    criteria
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {} ({} баллов)", i + 1, c.name, c.max_score))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt asking the model to distill a methodology document into
/// requirements and a short summary, answered as JSON.
pub fn method_analysis_prompt(document: &str) -> String {
    format!(
        r#"Анализ методички:
Документ: {document}
Задача:
1. Выявить ключевые требования (структура, критерии, форматы данных)
2. Сформулировать краткую сводку (3-5 пунктов)
Ответ в формате JSON:
{{
    "requirements": ["[]"],
    "summary": ["[]"]
}}"#,
        document = document
    )
}

/// The grading prompt: strict scoring instructions, the rubric, the
/// report's content-and-styles text, and the methodology requirements.
pub fn evaluation_prompt(
    criteria: &[Criterion],
    content: &str,
    requirements: &[String],
    summary: &[String],
) -> String {
    format!(
        r#"Вы — преподаватель, оценивающий отчеты по лабораторным работам.
Ваша задача — тщательно проверить отчет и снизить баллы за ошибки или недочеты.

ВАЖНО:
- Максимальный балл ставится ТОЛЬКО при полном отсутствии ошибок и замечаний.
- При наличии любых проблем баллы ОБЯЗАТЕЛЬНО снижаются.
- Итоговый балл должен быть точно подсчитан с учетом всех вычетов.
- Оценивайте СТРОГО по указанным критериям, не смешивая их между собой.

Система штрафов (для каждого критерия отдельно):
- Незначительные ошибки: -0.5 балла
- Существенные ошибки: -1 балл
- Критические ошибки: -2 балла и более

Критерии оценки:
{criteria}

Содержание и стили отчета:
{content}

Требования к отчету (из методички):
{requirements}

Сводка по работе (из методички):
{summary}

Инструкции по оценке:
1. Оцените каждый критерий отдельно, строго придерживаясь его описания.
2. Для критерия проверки отчета на правильность, структуру и соответствие требованиям:
   - Проверяйте ТОЛЬКО содержание, расчеты и соответствие требованиям методички.
   - НЕ учитывайте здесь аспекты оформления (такие ка нумерация, шрифты и т.д.).
3. Для критерия, где необходимо проверить ответы на вопросы:
   - Оценивайте ТОЛЬКО полноту и правильность ответов на вопросы.
   - Если раздел с вопросами есть, а ответов нет, то по этому критерию ставится 0.
4. Для критерия оформление:
   - Рассматривайте ТОЛЬКО аспекты форматирования, стиля и общего вида отчета.
5. Для каждого критерия:
   - Укажите начальный балл (максимальный для данного критерия).
   - Перечислите конкретные найденные ошибки и недочеты.
   - Укажите величину штрафа за каждую ошибку.
   - Вычтите все штрафы из начального балла.
   - Запишите итоговый балл по критерию.
6. Общий комментарий по работе
7. ФИО автора отчета с титульного листа работы

Формат ответа:
###

Критерий: <название критерия>
Комментарий к оценке: <комментарий на той же строке>
Штраф: <штраф>
Итоговый балл: <балл за критерий>
###

Критерий:
Комментарий к оценке:
Штраф:
Итоговый балл:
...

ФИО:
"#,
        criteria = format_criteria(criteria),
        content = content,
        requirements = requirements.join("\n"),
        summary = summary.join("\n")
    )
}

/// Prompt for the second, independent model call that pulls the author's
/// name off the title page. The model is told to answer `Не найдено` when
/// there is none.
pub fn author_prompt(content: &str) -> String {
    format!(
        r#"Найдите ФИО автора отчета в тексте.
Верните только ФИО, без дополнительного текста.
Если ФИО не найдено, верните "Не найдено".
ФИО находится НЕ в разделе "Проверил" и аналогичные.
Скорее всего находится в разделе "Выполнил".
В качестве ответа предоставь только ФИО.


Текст отчета:
{content}
"#,
        content = content
    )
}
