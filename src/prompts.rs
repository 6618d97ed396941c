/// LLM prompt templates
///
/// Builders for the three Gemini calls this system makes: per-row summary
/// generation (indexing pipeline), retrieval planning, and answer synthesis
/// (query service).

/// Relational schema description embedded into the planning prompt. Must
/// match migrations/0001_init.sql — the model writes SQL against this.
pub const POSTGRES_SCHEMA: &str = "\
Table Name: argo_profiles
Columns:
id (BIGSERIAL),
platform_id (TEXT),
cycle_number (INTEGER),
observed_at (TIMESTAMPTZ),
latitude (DOUBLE PRECISION),
longitude (DOUBLE PRECISION),
pressure (DOUBLE PRECISION, nullable),
temperature (DOUBLE PRECISION, nullable),
salinity (DOUBLE PRECISION, nullable)";

/// Vector collection description embedded into the planning prompt.
pub const VECTOR_DB_SCHEMA: &str = "\
A collection of documents containing contextual summaries of ARGO float
journeys and oceanographic regions. Use this to find relevant platform_ids
or background information.";

/// Build the per-row summary prompt for the indexing pipeline.
///
/// Asks for region and time-range identification, key feature extraction
/// (max temperature, min salinity, anomalies), and a fixed-shape JSON object
/// combining the structured fields with a human-readable summary.
pub fn build_summary_prompt(record_json: &str) -> String {
    format!(
        "You are an expert oceanographer AI assistant. Your task is to create a concise, \
         human-readable summary and structured documentation for a single ARGO float \
         based on its raw measurement data.\n\n\
         Input: A JSON object representing one row of the float's profile measurements.\n\n\
         Instructions:\n\
         1. Determine the primary ocean basin or region from the latitude and longitude.\n\
         2. Identify the time span of the measurements from the observation timestamp.\n\
         3. Identify key oceanographic features: the maximum temperature and minimum \
         salinity values if available, and any significant anomalies or trends.\n\
         4. Combine your findings into a concise, 3-5 sentence paragraph. Convert all \
         data into readable text. Do not include raw JSON or tables in the paragraph.\n\n\
         Output Format: Provide the final answer as a single, clean JSON object with \
         exactly these keys, and no text before or after it:\n\
         {{\n\
           \"platform_id\": \"<platform id>\",\n\
           \"region\": \"<primary region or ocean basin>\",\n\
           \"time_range\": \"<start date (YYYY-MM-DD) to end date (YYYY-MM-DD)>\",\n\
           \"summary\": \"<human-readable text summary>\",\n\
           \"oceanographic_features\": {{\n\
             \"max_temperature_celsius\": <value or null>,\n\
             \"min_salinity_psu\": <value or null>,\n\
             \"significant_anomalies\": \"<brief note or 'normal conditions'>\"\n\
           }}\n\
         }}\n\n\
         Here is the data:\n{record_json}"
    )
}

/// Build the retrieval-planning prompt for the analyze endpoint.
///
/// The model must answer with a single JSON object holding one key,
/// "queries": a list of {{tool, query}} pairs over the two available tools.
pub fn build_planning_prompt(user_query: &str) -> String {
    format!(
        "You are a world-class oceanographer AI assistant. Your goal is to help users \
         analyze ARGO float data.\n\n\
         You have access to two tools: a PostgreSQL database and a Vector Database.\n\n\
         Tool 1: PostgreSQL Database\n\
         Schema:\n{POSTGRES_SCHEMA}\n\
         Use this for precise queries on numerical data like temperature, salinity, \
         pressure, and location.\n\n\
         Tool 2: Vector Database\n\
         Schema:\n{VECTOR_DB_SCHEMA}\n\
         Use this to find relevant float platform_ids or contextual information based \
         on semantic user queries (e.g., \"floats in the Arabian Sea\", \"floats with \
         anomalies\").\n\n\
         User's Question: \"{user_query}\"\n\n\
         Based on the user's question, create a plan. Decide which tools to use.\n\n\
         Respond with a single JSON object containing a list of queries to execute. \
         The JSON object has one key: \"queries\". \
         \"queries\" is a list of objects, where each object has:\n\
         \"tool\" ('postgres' or 'vector')\n\
         \"query\" (the SQL query or the text to search in the vector DB).\n\n\
         Your Plan:"
    )
}

/// Build the synthesis prompt: the original question plus everything the
/// executed plan retrieved, serialized as JSON.
pub fn build_synthesis_prompt(user_query: &str, retrieved_data_json: &str) -> String {
    format!(
        "You are a helpful oceanographer AI assistant. You have been provided with data \
         retrieved from a database based on a user's question.\n\n\
         Original User Question: \"{user_query}\"\n\n\
         Retrieved Data:\n{retrieved_data_json}\n\n\
         Your task is to analyze the provided data and write a concise, one-paragraph \
         text insight that answers the user's original question. \
         Do not mention the database or the data structure. Just state the \
         oceanographic insight.\n\n\
         Insight:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planning_prompt_embeds_both_schemas_and_query() {
        let prompt = build_planning_prompt("warmest floats near the equator");
        assert!(prompt.contains("argo_profiles"));
        assert!(prompt.contains("observed_at"));
        assert!(prompt.contains("contextual summaries"));
        assert!(prompt.contains("warmest floats near the equator"));
    }

    #[test]
    fn summary_prompt_embeds_record() {
        let prompt = build_summary_prompt("{\"platform_id\":\"2902746\"}");
        assert!(prompt.contains("\"platform_id\":\"2902746\""));
        assert!(prompt.contains("max_temperature_celsius"));
    }
}
